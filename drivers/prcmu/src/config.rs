// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Tunables and the shared-memory layout of the mailboxes.
//!
//! The timing constants are firmware-revision specific. They are kept as
//! plain fields so a board can override them.

use core::time::Duration;

use crate::mailbox::{Mailbox, NUM_MAILBOXES};

/// Base of the eight request header bytes in TCDM.
pub const MBOX_HEADER_REQ_BASE: usize = 0xFE8;
/// Base of the eight acknowledge header bytes in TCDM.
pub const MBOX_HEADER_ACK_BASE: usize = 0xFF0;

/// Status byte firmware writes for a successful power-domain change.
pub const HWACC_PWR_ST_OK: u8 = 0xFE;
/// Status byte used by every other mailbox on success.
pub const ACK_STATUS_OK: u8 = 0x00;

/// Where one mailbox lives in TCDM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxLayout {
    /// Offset of the request payload region.
    pub req_offset: usize,
    /// Size of the request payload region.
    pub req_len: usize,
    /// Offset of the acknowledge region.
    pub ack_offset: usize,
    /// Size of the acknowledge region.
    pub ack_len: usize,
    /// Position of the status byte inside the acknowledge region, if
    /// firmware reports one on this mailbox.
    pub status_offset: Option<usize>,
    /// Status byte meaning success for this mailbox.
    pub ok_status: u8,
}

impl MailboxLayout {
    const fn new(req_offset: usize, req_len: usize, ack_offset: usize, ack_len: usize) -> Self {
        Self {
            req_offset,
            req_len,
            ack_offset,
            ack_len,
            status_offset: Some(0),
            ok_status: ACK_STATUS_OK,
        }
    }

    const fn with_status_at(mut self, offset: usize) -> Self {
        self.status_offset = Some(offset);
        self
    }

    /// The acknowledge carries data only; success is judged by the caller.
    const fn without_status(mut self) -> Self {
        self.status_offset = None;
        self
    }

    const fn with_ok_status(mut self, ok_status: u8) -> Self {
        self.ok_status = ok_status;
        self
    }
}

/// Layout of the DB8500-class firmware.
pub const DEFAULT_LAYOUT: [MailboxLayout; NUM_MAILBOXES] = [
    MailboxLayout::new(0xFDC, 12, 0xE08, 52),
    // Current ARM OPP, current APE OPP, APE voltage and DVFS status.
    MailboxLayout::new(0xFD0, 12, 0xE04, 4).without_status(),
    MailboxLayout::new(0xFC0, 16, 0xE00, 4)
        .with_status_at(2)
        .with_ok_status(HWACC_PWR_ST_OK),
    MailboxLayout::new(0xE4C, 372, 0xDFC, 4),
    MailboxLayout::new(0xE48, 4, 0xDF8, 4),
    MailboxLayout::new(0xE44, 4, 0xDF4, 4),
    MailboxLayout::new(0xE40, 4, 0xDF0, 4),
    MailboxLayout::new(0xE3C, 4, 0xDEC, 4),
];

/// Runtime configuration of the PRCMU driver.
#[derive(Debug, Clone)]
pub struct PrcmuConfig {
    /// Bound on waiting for an acknowledge.
    pub mailbox_timeout: Duration,
    /// Bound on waiting for a stale doorbell bit to clear before a request.
    pub doorbell_timeout: Duration,
    /// Bound on waiting for firmware to release a mailbox during recovery.
    pub recovery_timeout: Duration,
    /// Delay after toggling the GIC decouple request.
    pub gic_settle: Duration,
    /// Per-mailbox shared-memory layout.
    pub layout: [MailboxLayout; NUM_MAILBOXES],
}

impl PrcmuConfig {
    /// Creates the configuration matching the reference firmware.
    pub const fn new() -> Self {
        Self {
            mailbox_timeout: Duration::from_millis(500),
            doorbell_timeout: Duration::from_millis(10),
            recovery_timeout: Duration::from_millis(100),
            gic_settle: Duration::from_micros(1),
            layout: DEFAULT_LAYOUT,
        }
    }

    /// Overrides the acknowledge timeout.
    pub const fn with_mailbox_timeout(mut self, timeout: Duration) -> Self {
        self.mailbox_timeout = timeout;
        self
    }

    /// Overrides the doorbell wait bound.
    pub const fn with_doorbell_timeout(mut self, timeout: Duration) -> Self {
        self.doorbell_timeout = timeout;
        self
    }

    /// Overrides the recovery wait bound.
    pub const fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Overrides the GIC decouple settle delay.
    pub const fn with_gic_settle(mut self, delay: Duration) -> Self {
        self.gic_settle = delay;
        self
    }

    /// Returns the layout of `mailbox`.
    #[inline]
    pub fn layout(&self, mailbox: Mailbox) -> &MailboxLayout {
        &self.layout[mailbox as usize]
    }
}

impl Default for PrcmuConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_regions_do_not_overlap() {
        let mut regions: alloc::vec::Vec<(usize, usize)> = DEFAULT_LAYOUT
            .iter()
            .flat_map(|l| [(l.req_offset, l.req_len), (l.ack_offset, l.ack_len)])
            .collect();
        regions.push((MBOX_HEADER_REQ_BASE, NUM_MAILBOXES));
        regions.push((MBOX_HEADER_ACK_BASE, NUM_MAILBOXES));
        regions.sort();
        for pair in regions.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0, "{pair:?} overlap");
        }
    }

    #[test]
    fn test_overrides() {
        let cfg = PrcmuConfig::new().with_mailbox_timeout(Duration::from_millis(5));
        assert_eq!(cfg.mailbox_timeout, Duration::from_millis(5));
        assert_eq!(cfg.layout(Mailbox::Mb2).ok_status, HWACC_PWR_ST_OK);
        assert_eq!(cfg.layout(Mailbox::Mb1).ok_status, ACK_STATUS_OK);
    }

    #[test]
    fn test_status_byte_positions() {
        let cfg = PrcmuConfig::new();
        assert_eq!(cfg.layout(Mailbox::Mb0).status_offset, Some(0));
        assert_eq!(cfg.layout(Mailbox::Mb1).status_offset, None);
        assert_eq!(cfg.layout(Mailbox::Mb2).status_offset, Some(2));
        for layout in DEFAULT_LAYOUT {
            if let Some(offset) = layout.status_offset {
                assert!(offset < layout.ack_len);
            }
        }
    }
}
