// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Acknowledge interrupt demultiplexing.
//!
//! [`Prcmu::handle_irq`] runs in interrupt context: it only reads
//! acknowledges, clears their pending bits and signals completions. Anything
//! that needs to talk back to firmware is queued as [`DeferredWork`] and
//! executed by [`Prcmu::run_deferred`] from task context.

use strum::IntoEnumIterator;

use crate::{
    driver::Prcmu,
    hal::{MailboxBits, PRCM_ARM_IT1_CLR, PRCM_ARM_IT1_VAL, PrcmuHal},
    mailbox::{Delivery, Mailbox, MailboxAcknowledge},
    wakeup::{decode_wakeup, mb0},
};

/// Follow-up actions scheduled by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredWork {
    /// Acknowledge a wake-up notification so firmware can post the next one.
    AckWakeup,
}

impl<H: PrcmuHal> Prcmu<H> {
    /// Services the PRCMU acknowledge interrupt.
    ///
    /// Returns the mailboxes that had an acknowledge pending.
    pub fn handle_irq(&self) -> MailboxBits {
        let hal = self.hal();
        let pending = MailboxBits::from_bits_truncate(hal.read_reg(PRCM_ARM_IT1_VAL));
        if pending.is_empty() {
            return pending;
        }
        trace!("PRCMU IRQ: {pending:?}");
        for mailbox in Mailbox::iter().filter(|mb| pending.contains(mb.bit())) {
            let ack = self.transport.read_ack(mailbox);
            hal.write_reg(PRCM_ARM_IT1_CLR, mailbox.bit().bits());
            match self.transport.deliver(mailbox, ack) {
                Delivery::Completed | Delivery::Discarded => {}
                Delivery::Unsolicited(ack) => self.handle_unsolicited(mailbox, ack),
            }
        }
        pending
    }

    /// Runs the work queued by [`handle_irq`](Self::handle_irq).
    ///
    /// Returns the number of items executed. Items that fail are logged and
    /// dropped; firmware re-posts an unacknowledged wake-up notification.
    pub fn run_deferred(&self) -> usize {
        let mut count = 0;
        loop {
            let Some(work) = self.deferred.lock().pop_front() else {
                break;
            };
            count += 1;
            match work {
                DeferredWork::AckWakeup => {
                    if let Err(err) = self.ack_wakeup() {
                        warn!("wake-up acknowledge failed: {err}");
                    }
                }
            }
        }
        count
    }

    /// Whether deferred work is waiting.
    pub fn has_deferred(&self) -> bool {
        !self.deferred.lock().is_empty()
    }

    /// Status byte of the last power-state transition firmware reported.
    pub fn last_transition_status(&self) -> Option<u8> {
        *self.last_transition_status.lock()
    }

    fn handle_unsolicited(&self, mailbox: Mailbox, ack: MailboxAcknowledge) {
        match (mailbox, ack.header) {
            (Mailbox::Mb0, mb0::WAKEUP_EXE | mb0::WAKEUP_SLEEP) => {
                let events = decode_wakeup(&ack);
                debug!("wake-up notification: {events:?}");
                self.wakeups.lock().record(events);
                self.deferred.lock().push_back(DeferredWork::AckWakeup);
            }
            (Mailbox::Mb0, mb0::POWER_STATE_TRANS) => {
                trace!("power-state transition status {:02x?}", ack.status);
                *self.last_transition_status.lock() = ack.status;
            }
            _ => {
                warn!(
                    "unexpected acknowledge {:#04x} on {mailbox:?}",
                    ack.header
                );
            }
        }
    }
}
