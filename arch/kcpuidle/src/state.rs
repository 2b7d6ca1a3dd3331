// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Per-CPU and cross-CPU idle bookkeeping.

use core::{
    sync::atomic::{AtomicU8, Ordering},
    time::Duration,
};

use crate::{MAX_CPUS, cstate::DEPTH_RUNNING};

/// Runtime record of one CPU.
///
/// The governor limit may be updated from anywhere; a CPU samples it once
/// per idle period, when it enters idle.
#[derive(Debug)]
pub struct CpuState {
    max_depth: AtomicU8,
    last_depth: AtomicU8,
}

impl CpuState {
    pub(crate) const fn new(max_depth: u8) -> Self {
        Self {
            max_depth: AtomicU8::new(max_depth),
            last_depth: AtomicU8::new(0),
        }
    }

    /// Deepest depth the governor currently allows.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Acquire) as usize
    }

    pub(crate) fn set_max_depth(&self, depth: usize) {
        self.max_depth.store(depth as u8, Ordering::Release);
    }

    /// Depth of the last completed idle period.
    #[inline]
    pub fn last_depth(&self) -> usize {
        self.last_depth.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn set_last_depth(&self, depth: usize) {
        self.last_depth.store(depth as u8, Ordering::Relaxed);
    }
}

/// State shared by the CPUs, guarded by the idle lock.
#[derive(Debug, Default)]
pub(crate) struct IdleShared {
    /// Next scheduled wake-up of each CPU while it idles.
    pub deadlines: [Option<Duration>; MAX_CPUS],
    /// Set when a coupled state powered the cores off; each CPU restores
    /// its own context on the way out.
    pub restore_core: [bool; MAX_CPUS],
    /// Set when the APE domain was powered off; the first CPU out restores it.
    pub ape_restore_pending: bool,
    /// Governor limit of each CPU as sampled at its last idle entry.
    pub limits: [usize; MAX_CPUS],
    /// Depth handed to firmware by the CPU that committed a coupled state,
    /// until that CPU leaves it. A CPU going to WFI meanwhile joins it.
    pub committed: Option<usize>,
}

impl IdleShared {
    /// Earliest deadline among the first `online` CPUs.
    pub fn earliest_deadline(&self, online: usize) -> Option<Duration> {
        self.deadlines[..online].iter().flatten().min().copied()
    }

    /// Minimum of the sampled governor limits of the first `online` CPUs.
    pub fn governor_limit(&self, online: usize) -> usize {
        self.limits[..online].iter().copied().min().unwrap_or(DEPTH_RUNNING)
    }

    /// Takes the restore flags owed to `cpu`: its own core context and,
    /// if still pending, the APE context.
    pub fn take_restore(&mut self, cpu: usize) -> (bool, bool) {
        let core = core::mem::take(&mut self.restore_core[cpu]);
        let ape = core::mem::take(&mut self.ape_restore_pending);
        (core, ape)
    }

    /// Forgets a coupled state that was not handed to firmware.
    pub fn clear_restore(&mut self) {
        self.restore_core = [false; MAX_CPUS];
        self.ape_restore_pending = false;
        self.committed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_deadline() {
        let mut shared = IdleShared::default();
        assert_eq!(shared.earliest_deadline(2), None);
        shared.deadlines[1] = Some(Duration::from_millis(6));
        assert_eq!(shared.earliest_deadline(2), Some(Duration::from_millis(6)));
        assert_eq!(shared.earliest_deadline(1), None);
        shared.deadlines[0] = Some(Duration::from_millis(5));
        assert_eq!(shared.earliest_deadline(2), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_governor_limit_uses_samples() {
        let mut shared = IdleShared {
            limits: [6, 2],
            ..Default::default()
        };
        assert_eq!(shared.governor_limit(2), 2);
        assert_eq!(shared.governor_limit(1), 6);
        shared.limits[1] = 6;
        assert_eq!(shared.governor_limit(2), 6);
    }

    #[test]
    fn test_clear_restore_drops_commit() {
        let mut shared = IdleShared {
            restore_core: [true, true],
            ape_restore_pending: true,
            committed: Some(6),
            ..Default::default()
        };
        shared.clear_restore();
        assert_eq!(shared.take_restore(0), (false, false));
        assert_eq!(shared.committed, None);
    }

    #[test]
    fn test_take_restore_once() {
        let mut shared = IdleShared {
            restore_core: [true, true],
            ape_restore_pending: true,
            ..Default::default()
        };
        assert_eq!(shared.take_restore(1), (true, true));
        assert_eq!(shared.take_restore(1), (false, false));
        assert_eq!(shared.take_restore(0), (true, false));
    }
}
