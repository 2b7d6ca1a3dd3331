// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Request/acknowledge framing over the shared-memory mailboxes.
//!
//! Each mailbox owns a request header byte, a request payload region, an
//! acknowledge header byte and an acknowledge region in TCDM, plus one bit in
//! the doorbell and acknowledge registers. A request is written, the doorbell
//! bit is set, and the caller blocks until the interrupt dispatcher delivers
//! the matching acknowledge. At most one request is outstanding per mailbox.

use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use kspin::SpinNoIrq;
use spin::{Mutex, MutexGuard};
use strum::{EnumCount, EnumIter, FromRepr};

use crate::{
    config::{MBOX_HEADER_ACK_BASE, MBOX_HEADER_REQ_BASE, MailboxLayout, PrcmuConfig},
    error::{MailboxError, MailboxResult},
    hal::{MailboxBits, PRCM_ARM_IT1_CLR, PRCM_ARM_IT1_VAL, PRCM_MBOX_CPU_SET, PRCM_MBOX_CPU_VAL, PrcmuHal},
};

/// Number of hardware mailboxes.
pub const NUM_MAILBOXES: usize = Mailbox::COUNT;

/// A hardware mailbox.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, EnumIter, EnumCount)]
pub enum Mailbox {
    /// Power-state transitions and wake-up events.
    Mb0 = 0,
    /// Operating points.
    Mb1 = 1,
    /// Power domains (EPOD).
    Mb2 = 2,
    /// System clock requests.
    Mb3 = 3,
    Mb4 = 4,
    Mb5 = 5,
    Mb6 = 6,
    Mb7 = 7,
}

impl Mailbox {
    /// Returns the bit of this mailbox in the doorbell/acknowledge registers.
    #[inline]
    pub const fn bit(self) -> MailboxBits {
        MailboxBits::from_bits_truncate(1 << self as u32)
    }

    /// TCDM offset of the request header byte.
    #[inline]
    pub const fn req_header_offset(self) -> usize {
        MBOX_HEADER_REQ_BASE + self as usize
    }

    /// TCDM offset of the acknowledge header byte.
    #[inline]
    pub const fn ack_header_offset(self) -> usize {
        MBOX_HEADER_ACK_BASE + self as usize
    }
}

/// A request to be written into a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRequest {
    header: u8,
    payload: Vec<u8>,
}

impl MailboxRequest {
    /// Creates a request with an empty payload.
    pub fn new(header: u8) -> Self {
        Self {
            header,
            payload: Vec::new(),
        }
    }

    /// Creates a request carrying `payload` from the start of the region.
    pub fn with_payload(header: u8, payload: &[u8]) -> Self {
        Self {
            header,
            payload: payload.to_vec(),
        }
    }

    /// Stores `value` at `offset` of the payload, growing it with zeroes.
    pub fn put_u8(&mut self, offset: usize, value: u8) -> &mut Self {
        if self.payload.len() <= offset {
            self.payload.resize(offset + 1, 0);
        }
        self.payload[offset] = value;
        self
    }

    /// Stores `value` little-endian at `offset` of the payload.
    pub fn put_u32(&mut self, offset: usize, value: u32) -> &mut Self {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.put_u8(offset + i, b);
        }
        self
    }

    /// The op code.
    #[inline]
    pub fn header(&self) -> u8 {
        self.header
    }

    /// The payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// An acknowledge read back from a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxAcknowledge {
    /// Acknowledge header, mirrors the request op code.
    pub header: u8,
    /// Status byte, on mailboxes that report one.
    pub status: Option<u8>,
    /// The whole acknowledge region, status byte included.
    pub payload: Vec<u8>,
}

impl MailboxAcknowledge {
    /// Returns the byte at `offset` of the acknowledge region, or zero past the end.
    pub fn byte(&self, offset: usize) -> u8 {
        self.payload.get(offset).copied().unwrap_or(0)
    }

    /// Returns the little-endian word at `offset`, zero-filled past the end.
    pub fn word(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.byte(offset + i);
        }
        u32::from_le_bytes(bytes)
    }
}

/// Protocol state of one mailbox.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum MailboxState {
    /// No request outstanding.
    Idle = 0,
    /// A request was handed to firmware and a caller waits for it.
    RequestSent = 1,
    /// The last request was not acknowledged in time.
    TimedOut = 2,
}

struct MailboxSlot {
    lock: Mutex<()>,
    state: AtomicU8,
    done: AtomicBool,
    ack: SpinNoIrq<Option<MailboxAcknowledge>>,
}

impl MailboxSlot {
    const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            state: AtomicU8::new(MailboxState::Idle as u8),
            done: AtomicBool::new(false),
            ack: SpinNoIrq::new(None),
        }
    }

    fn state(&self) -> MailboxState {
        MailboxState::from_repr(self.state.load(Ordering::Acquire)).unwrap_or(MailboxState::Idle)
    }

    fn set_state(&self, state: MailboxState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn reset_completion(&self) {
        self.done.store(false, Ordering::Release);
        self.ack.lock().take();
    }

    fn complete(&self, ack: MailboxAcknowledge) {
        *self.ack.lock() = Some(ack);
        self.done.store(true, Ordering::Release);
    }

    fn take_completion(&self) -> Option<MailboxAcknowledge> {
        if !self.done.load(Ordering::Acquire) {
            return None;
        }
        self.done.store(false, Ordering::Release);
        self.ack.lock().take()
    }
}

/// What the dispatcher did with an acknowledge it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the caller blocked in [`MailboxTransport::send`].
    Completed,
    /// Arrived after the waiter gave up; dropped.
    Discarded,
    /// Nobody waits on this mailbox; the acknowledge is returned for
    /// protocol-level handling.
    Unsolicited(MailboxAcknowledge),
}

/// Serialized access to the eight mailboxes.
pub struct MailboxTransport<H: PrcmuHal> {
    hal: Arc<H>,
    config: PrcmuConfig,
    slots: [MailboxSlot; NUM_MAILBOXES],
}

impl<H: PrcmuHal> MailboxTransport<H> {
    /// Creates a transport over `hal`.
    pub fn new(hal: Arc<H>, config: PrcmuConfig) -> Self {
        Self {
            hal,
            config,
            slots: [const { MailboxSlot::new() }; NUM_MAILBOXES],
        }
    }

    /// The configuration in use.
    #[inline]
    pub fn config(&self) -> &PrcmuConfig {
        &self.config
    }

    /// The hardware accessor.
    #[inline]
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Returns the protocol state of `mailbox`.
    pub fn state(&self, mailbox: Mailbox) -> MailboxState {
        self.slots[mailbox as usize].state()
    }

    /// Sends `request` on `mailbox` and blocks until it is acknowledged.
    ///
    /// The mailbox lock is held for the whole exchange, so interrupts must
    /// stay enabled on the calling CPU for the acknowledge to arrive.
    pub fn send(&self, mailbox: Mailbox, request: &MailboxRequest) -> MailboxResult<MailboxAcknowledge> {
        let layout = *self.config.layout(mailbox);
        if request.payload.len() > layout.req_len {
            return Err(MailboxError::PayloadTooLarge(mailbox));
        }
        let slot = &self.slots[mailbox as usize];
        let _guard = slot.lock.lock();
        if slot.state() == MailboxState::TimedOut {
            return Err(MailboxError::Desynchronized(mailbox));
        }
        self.wait_doorbell_clear(mailbox, self.config.doorbell_timeout)?;

        slot.reset_completion();
        slot.set_state(MailboxState::RequestSent);
        self.write_request(mailbox, &layout, request);

        match self.wait_completion(slot) {
            Some(ack) => {
                slot.set_state(MailboxState::Idle);
                debug!(
                    "{mailbox:?} acked header {:#04x} status {:02x?}",
                    ack.header, ack.status
                );
                if ack.header != request.header {
                    return Err(MailboxError::HeaderMismatch {
                        expected: request.header,
                        found: ack.header,
                    });
                }
                if let Some(status) = ack.status.filter(|s| *s != layout.ok_status) {
                    warn!("{mailbox:?} request {:#04x} nacked: {status:#04x}", request.header);
                    return Err(MailboxError::Nacked(status));
                }
                Ok(ack)
            }
            None => {
                warn!(
                    "{mailbox:?} request {:#04x} not acknowledged within {:?}",
                    request.header, self.config.mailbox_timeout
                );
                Err(MailboxError::Timeout(mailbox))
            }
        }
    }

    /// Writes `request` and rings the doorbell without waiting for an acknowledge.
    ///
    /// Used for mailbox 0 traffic where firmware answers asynchronously.
    pub fn post(&self, mailbox: Mailbox, request: &MailboxRequest) -> MailboxResult<()> {
        let layout = *self.config.layout(mailbox);
        if request.payload.len() > layout.req_len {
            return Err(MailboxError::PayloadTooLarge(mailbox));
        }
        let _guard = self.slots[mailbox as usize].lock.lock();
        self.wait_doorbell_clear(mailbox, self.config.doorbell_timeout)?;
        self.write_request(mailbox, &layout, request);
        Ok(())
    }

    /// Like [`post`](Self::post) but never waits: fails with
    /// [`MailboxError::Busy`] if the mailbox is locked or still owned by firmware.
    pub fn try_post(&self, mailbox: Mailbox, request: &MailboxRequest) -> MailboxResult<()> {
        let layout = *self.config.layout(mailbox);
        if request.payload.len() > layout.req_len {
            return Err(MailboxError::PayloadTooLarge(mailbox));
        }
        let _guard: MutexGuard<'_, ()> = self.slots[mailbox as usize]
            .lock
            .try_lock()
            .ok_or(MailboxError::Busy(mailbox))?;
        if self.doorbell_pending(mailbox) {
            return Err(MailboxError::Busy(mailbox));
        }
        self.write_request(mailbox, &layout, request);
        Ok(())
    }

    /// Re-synchronizes a mailbox after [`MailboxError::Timeout`].
    ///
    /// Waits for firmware to release the doorbell bit, drops any late
    /// acknowledge and returns the mailbox to [`MailboxState::Idle`].
    pub fn recover(&self, mailbox: Mailbox) -> MailboxResult<()> {
        let slot = &self.slots[mailbox as usize];
        let _guard = slot.lock.lock();
        if slot.state() != MailboxState::TimedOut {
            return Ok(());
        }
        self.wait_doorbell_clear(mailbox, self.config.recovery_timeout)?;
        if MailboxBits::from_bits_truncate(self.hal.read_reg(PRCM_ARM_IT1_VAL)).contains(mailbox.bit()) {
            self.hal.write_reg(PRCM_ARM_IT1_CLR, mailbox.bit().bits());
        }
        slot.reset_completion();
        slot.set_state(MailboxState::Idle);
        info!("{mailbox:?} recovered");
        Ok(())
    }

    /// Reads the acknowledge of `mailbox` out of TCDM.
    pub(crate) fn read_ack(&self, mailbox: Mailbox) -> MailboxAcknowledge {
        let layout = self.config.layout(mailbox);
        let header = self.hal.tcdm_read(mailbox.ack_header_offset());
        let mut region = vec![0u8; layout.ack_len];
        self.hal.tcdm_read_bytes(layout.ack_offset, &mut region);
        let status = layout.status_offset.and_then(|at| region.get(at).copied());
        MailboxAcknowledge {
            header,
            status,
            payload: region,
        }
    }

    /// Routes an acknowledge to whoever waits on `mailbox`.
    pub(crate) fn deliver(&self, mailbox: Mailbox, ack: MailboxAcknowledge) -> Delivery {
        let slot = &self.slots[mailbox as usize];
        match slot.state() {
            MailboxState::RequestSent => {
                slot.complete(ack);
                Delivery::Completed
            }
            MailboxState::TimedOut => {
                warn!(
                    "{mailbox:?} late acknowledge {:#04x} discarded",
                    ack.header
                );
                Delivery::Discarded
            }
            MailboxState::Idle => Delivery::Unsolicited(ack),
        }
    }

    fn doorbell_pending(&self, mailbox: Mailbox) -> bool {
        MailboxBits::from_bits_truncate(self.hal.read_reg(PRCM_MBOX_CPU_VAL)).contains(mailbox.bit())
    }

    fn wait_doorbell_clear(&self, mailbox: Mailbox, bound: core::time::Duration) -> MailboxResult<()> {
        let start = self.hal.now();
        while self.doorbell_pending(mailbox) {
            if self.hal.now().saturating_sub(start) >= bound {
                warn!("{mailbox:?} doorbell still set after {bound:?}");
                return Err(MailboxError::Busy(mailbox));
            }
            self.hal.relax();
        }
        Ok(())
    }

    fn write_request(&self, mailbox: Mailbox, layout: &MailboxLayout, request: &MailboxRequest) {
        trace!(
            "{mailbox:?} request {:#04x} ({} bytes)",
            request.header,
            request.payload.len()
        );
        self.hal.tcdm_write_bytes(layout.req_offset, &request.payload);
        self.hal.tcdm_write(mailbox.req_header_offset(), request.header);
        self.hal.write_reg(PRCM_MBOX_CPU_SET, mailbox.bit().bits());
    }

    fn wait_completion(&self, slot: &MailboxSlot) -> Option<MailboxAcknowledge> {
        let start = self.hal.now();
        loop {
            if let Some(ack) = slot.take_completion() {
                return Some(ack);
            }
            if self.hal.now().saturating_sub(start) >= self.config.mailbox_timeout {
                slot.set_state(MailboxState::TimedOut);
                // An acknowledge racing the deadline is still honoured.
                return slot.take_completion();
            }
            self.hal.relax();
        }
    }
}
