// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

use core::fmt;

/// Configuration errors of the idle subsystem.
///
/// Idle entry itself never fails: every problem on that path degrades to a
/// shallower state instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleError {
    /// The cstate table violates an ordering or consistency rule.
    InvalidTable(&'static str),
    /// The CPU index is outside the online set.
    InvalidCpu(usize),
    /// The depth is not an entry of the cstate table.
    InvalidDepth(usize),
    /// More CPUs online than the controller supports.
    TooManyCpus(usize),
}

impl fmt::Display for IdleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleError::InvalidTable(why) => write!(f, "invalid cstate table: {why}"),
            IdleError::InvalidCpu(cpu) => write!(f, "invalid CPU {cpu}"),
            IdleError::InvalidDepth(depth) => write!(f, "invalid idle depth {depth}"),
            IdleError::TooManyCpus(n) => write!(f, "{n} CPUs online, at most {} supported", crate::MAX_CPUS),
        }
    }
}

/// Result of an idle configuration call.
pub type IdleResult<T = ()> = Result<T, IdleError>;
