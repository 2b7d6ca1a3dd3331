// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Driver for the PRCMU, the power/reset/clock companion controller.
//!
//! The application cores talk to the PRCMU through eight shared-memory
//! mailboxes. [`MailboxTransport`] serializes requests per mailbox and waits
//! for the acknowledge that [`Prcmu::handle_irq`] demultiplexes from the
//! interrupt line. On top of it sit the [`ClockService`], the
//! [`EpodPowerController`], operating-point and wake-up requests, and the
//! latency-critical register operations used by the idle path.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;
extern crate alloc;

pub mod clock;
pub mod config;
mod dispatch;
mod driver;
pub mod epod;
mod error;
pub mod hal;
pub mod mailbox;
pub mod opp;
pub mod power;
pub mod wakeup;

pub use clock::{ClockDesc, ClockId, ClockOps, ClockService, ClockTable, PrccHal, PrcmuClock};
pub use config::{MailboxLayout, PrcmuConfig};
pub use dispatch::DeferredWork;
pub use driver::Prcmu;
pub use epod::{EpodId, EpodPowerController, EpodState};
pub use error::{MailboxError, MailboxResult, PrcmuError, PrcmuResult};
pub use hal::{MailboxBits, MmioPrcmu, PrcmuHal, WAKE_MASK_WORDS};
pub use mailbox::{Mailbox, MailboxAcknowledge, MailboxRequest, MailboxState, MailboxTransport};
pub use opp::{ApeOpp, ArmOpp, OppStatus};
pub use power::PowerTransition;
pub use wakeup::WakeupEvents;
