// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Idle residency counters.

use alloc::{vec, vec::Vec};
use core::time::Duration;

/// Usage of one idle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateUsage {
    pub entries: u64,
    pub time: Duration,
}

/// Snapshot of the idle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleStats {
    /// Indexed by depth.
    pub states: Vec<StateUsage>,
    /// Idle entries abandoned because an interrupt was already pending.
    pub irq_aborts: u64,
    /// Coupled attempts given up because the sibling never reached WFI.
    pub sibling_timeouts: u64,
    /// Coupled attempts refused because mailbox 0 was busy.
    pub firmware_busy: u64,
    /// Coupled attempts dropped because the sibling re-entered idle with a
    /// lower limit or had already committed a state.
    pub sibling_changes: u64,
}

impl IdleStats {
    pub(crate) fn new(depths: usize) -> Self {
        Self {
            states: vec![StateUsage::default(); depths],
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, depth: usize, time: Duration) {
        if let Some(usage) = self.states.get_mut(depth) {
            usage.entries += 1;
            usage.time += time;
        }
    }

    /// Total number of idle periods, aborted ones included.
    pub fn total_entries(&self) -> u64 {
        self.states.iter().map(|s| s.entries).sum()
    }
}
