// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Cooperative CPU idle for the dual-core application processor.
//!
//! Both cores share the APE power domain and the ARM PLL, so states deeper
//! than WFI are only entered once every online core is idle. The
//! [`CpuIdleController`] picks the depth; the coupled states are sequenced
//! around the PRCMU in [`sleep`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let idle = CpuIdleController::new(prcmu, platform, IdleConfig::new())?;
//! // From the idle task of each CPU, with interrupts masked:
//! let outcome = idle.enter_idle(cpu, next_timer_deadline);
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;
extern crate alloc;

mod config;
mod controller;
pub mod cstate;
mod error;
mod platform;
pub mod sleep;
mod state;
mod stats;

/// Number of cores taking part in idle coordination.
pub const MAX_CPUS: usize = 2;

pub use config::IdleConfig;
pub use controller::{CpuIdleController, IdleOutcome, select_depth};
pub use cstate::{
    ApeState, ArmState, CState, CStateTable, DEFAULT_CSTATES, DEPTH_RUNNING, DEPTH_WFI, DomainStates,
    EsramState, PllState, StateKind,
};
pub use error::{IdleError, IdleResult};
pub use platform::IdlePlatform;
pub use state::CpuState;
pub use stats::{IdleStats, StateUsage};
