// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Error types for the PRCMU mailbox protocol and the services built on it.

use core::fmt;

use crate::mailbox::Mailbox;

/// Failures of a single mailbox exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// Firmware did not acknowledge within the configured bound. The mailbox
    /// stays unusable until [`recover`](crate::MailboxTransport::recover) is called.
    Timeout(Mailbox),
    /// Firmware acknowledged with a failure status.
    Nacked(u8),
    /// The doorbell bit of the mailbox did not clear in time, or the
    /// latency-critical path found the mailbox in use.
    Busy(Mailbox),
    /// A previous request timed out and the mailbox was not recovered.
    Desynchronized(Mailbox),
    /// The acknowledge header does not mirror the request header.
    HeaderMismatch {
        /// Header that was sent.
        expected: u8,
        /// Header that came back.
        found: u8,
    },
    /// The payload does not fit the request region of the mailbox.
    PayloadTooLarge(Mailbox),
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxError::Timeout(mb) => write!(f, "{mb:?} acknowledge timed out"),
            MailboxError::Nacked(status) => write!(f, "request refused with status {status:#04x}"),
            MailboxError::Busy(mb) => write!(f, "{mb:?} still owned by firmware"),
            MailboxError::Desynchronized(mb) => write!(f, "{mb:?} needs recovery after a timeout"),
            MailboxError::HeaderMismatch { expected, found } => write!(
                f,
                "acknowledge header {found:#04x} does not match request {expected:#04x}"
            ),
            MailboxError::PayloadTooLarge(mb) => write!(f, "payload too large for {mb:?}"),
        }
    }
}

/// Errors surfaced by the clock, power-domain and operating-point services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrcmuError {
    /// The mailbox exchange behind the request failed.
    Mailbox(MailboxError),
    /// The caller asked for something the hardware cannot represent.
    /// Rejected before any hardware access.
    InvalidArgument,
    /// No clock with the given name is known.
    UnknownClock,
}

impl From<MailboxError> for PrcmuError {
    fn from(err: MailboxError) -> Self {
        PrcmuError::Mailbox(err)
    }
}

impl fmt::Display for PrcmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrcmuError::Mailbox(err) => write!(f, "mailbox error: {err}"),
            PrcmuError::InvalidArgument => write!(f, "invalid argument"),
            PrcmuError::UnknownClock => write!(f, "unknown clock"),
        }
    }
}

/// Result of a mailbox exchange.
pub type MailboxResult<T> = Result<T, MailboxError>;

/// Result of a PRCMU service call.
pub type PrcmuResult<T = ()> = Result<T, PrcmuError>;
