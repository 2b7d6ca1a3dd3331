// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Wake-up events and the modem AC-wake request, both carried by mailbox 0.

use bitflags::bitflags;

use crate::{
    driver::Prcmu,
    error::MailboxResult,
    hal::{HOSTACCESS_REQ_BIT, PRCM_HOSTACCESS_REQ, PrcmuHal},
    mailbox::{Mailbox, MailboxAcknowledge, MailboxRequest},
};

/// Mailbox 0 op codes.
pub mod mb0 {
    /// Power-state transition request / status.
    pub const POWER_STATE_TRANS: u8 = 0;
    /// Configure wake-up sources while executing.
    pub const CONFIG_WAKEUPS_EXE: u8 = 1;
    /// Unsolicited wake-up notification while executing.
    pub const WAKEUP_EXE: u8 = 2;
    /// Acknowledge of a wake-up notification.
    pub const READ_WAKEUP_ACK: u8 = 3;
    /// Configure wake-up sources for sleep.
    pub const CONFIG_WAKEUPS_SLEEP: u8 = 4;
    /// Unsolicited wake-up notification out of sleep.
    pub const WAKEUP_SLEEP: u8 = 5;

    /// Request payload offsets.
    pub const REQ_AP_POWER_STATE: usize = 0x0;
    pub const REQ_AP_PLL_STATE: usize = 0x1;
    pub const REQ_ULP_CLOCK_STATE: usize = 0x2;
    pub const REQ_DO_NOT_WFI: usize = 0x3;
    pub const REQ_WAKEUP_8500: usize = 0x4;

    /// Acknowledge region offsets.
    pub const ACK_POWER_STATE_STATUS: usize = 0x0;
    pub const ACK_READ_POINTER: usize = 0x1;
    pub const ACK_WAKEUP_0: usize = 0x4;
    pub const ACK_WAKEUP_STRIDE: usize = 0x18;
}

bitflags! {
    /// Wake-up sources understood by firmware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WakeupEvents: u32 {
        const RTC = 1 << 0;
        const RTT0 = 1 << 1;
        const RTT1 = 1 << 2;
        const HSI0 = 1 << 3;
        const HSI1 = 1 << 4;
        const CA_WAKE = 1 << 5;
        const USB = 1 << 6;
        const ABB = 1 << 7;
        const ABB_FIFO = 1 << 8;
        const SYSCLK_OK = 1 << 9;
        const CA_SLEEP = 1 << 10;
        const AC_WAKE_ACK = 1 << 11;
        const SIDE_TONE_OK = 1 << 12;
        const ANC_OK = 1 << 13;
        const SW_ERROR = 1 << 14;
        const AC_SLEEP_ACK = 1 << 15;
        const ARM = 1 << 17;
        const HOTMON_LOW = 1 << 18;
        const HOTMON_HIGH = 1 << 19;
        const MODEM_SW_RESET_REQ = 1 << 20;
        const GPIO0 = 1 << 23;
        const GPIO1 = 1 << 24;
        const GPIO2 = 1 << 25;
        const GPIO3 = 1 << 26;
        const GPIO4 = 1 << 27;
        const GPIO5 = 1 << 28;
        const GPIO6 = 1 << 29;
        const GPIO7 = 1 << 30;
        const GPIO8 = 1 << 31;
    }
}

/// Wake-up notifications received but not yet consumed.
#[derive(Debug, Default)]
pub struct WakeupLog {
    pending: WakeupEvents,
    notifications: u64,
}

impl WakeupLog {
    pub(crate) const fn new() -> Self {
        Self {
            pending: WakeupEvents::empty(),
            notifications: 0,
        }
    }

    pub(crate) fn record(&mut self, events: WakeupEvents) {
        self.pending |= events;
        self.notifications += 1;
    }
}

/// Decodes the event word of a wake-up notification.
///
/// Firmware double-buffers the event words; the read pointer selects the
/// half written last.
pub(crate) fn decode_wakeup(ack: &MailboxAcknowledge) -> WakeupEvents {
    let half = (ack.byte(mb0::ACK_READ_POINTER) & 1) as usize;
    WakeupEvents::from_bits_truncate(ack.word(mb0::ACK_WAKEUP_0 + half * mb0::ACK_WAKEUP_STRIDE))
}

impl<H: PrcmuHal> Prcmu<H> {
    /// Enables `events` as wake-up sources.
    pub fn config_wakeups(&self, events: WakeupEvents, for_sleep: bool) -> MailboxResult<()> {
        let header = if for_sleep {
            mb0::CONFIG_WAKEUPS_SLEEP
        } else {
            mb0::CONFIG_WAKEUPS_EXE
        };
        let mut req = MailboxRequest::new(header);
        req.put_u32(mb0::REQ_WAKEUP_8500, events.bits());
        debug!("config wakeups {events:?} (sleep: {for_sleep})");
        self.transport.post(Mailbox::Mb0, &req)
    }

    /// Tells firmware the last wake-up notification was consumed.
    pub(crate) fn ack_wakeup(&self) -> MailboxResult<()> {
        self.transport
            .post(Mailbox::Mb0, &MailboxRequest::new(mb0::READ_WAKEUP_ACK))
    }

    /// Returns and clears the wake-up events seen since the last call.
    pub fn take_wakeup_events(&self) -> WakeupEvents {
        core::mem::take(&mut self.wakeups.lock().pending)
    }

    /// Number of wake-up notifications received so far.
    pub fn wakeup_notifications(&self) -> u64 {
        self.wakeups.lock().notifications
    }

    /// Requests the modem-side AC wake. Counted; the host access request
    /// is raised on the first reference.
    pub fn ac_wake_request(&self) {
        let mut refs = self.ac_wake_refs.lock();
        if *refs == 0 {
            let hal = self.hal();
            let val = hal.read_reg(PRCM_HOSTACCESS_REQ);
            hal.write_reg(PRCM_HOSTACCESS_REQ, val | HOSTACCESS_REQ_BIT);
            debug!("AC wake requested");
        }
        *refs += 1;
    }

    /// Drops one AC-wake reference. Unbalanced releases are ignored.
    pub fn ac_wake_release(&self) {
        let mut refs = self.ac_wake_refs.lock();
        match *refs {
            0 => warn!("unbalanced AC wake release"),
            1 => {
                let hal = self.hal();
                let val = hal.read_reg(PRCM_HOSTACCESS_REQ);
                hal.write_reg(PRCM_HOSTACCESS_REQ, val & !HOSTACCESS_REQ_BIT);
                *refs = 0;
                debug!("AC wake released");
            }
            _ => *refs -= 1,
        }
    }

    /// Whether an AC wake is currently requested.
    pub fn is_ac_wake_requested(&self) -> bool {
        *self.ac_wake_refs.lock() > 0
    }
}
