// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Idle depth selection across the two cores.
//!
//! The first CPU to go idle only ever executes WFI, since the shared
//! domains are still in use by its sibling. The last one waits for the
//! sibling to sit in WFI, picks the deepest state every CPU can afford and
//! hands the transition to firmware. Every failure on the way degrades to
//! WFI or straight back to running; nothing is reported to the scheduler.
//!
//! Governor limits are sampled once per idle period, at entry, and kept
//! under the idle lock. A CPU sitting in WFI saved its context against its
//! sample, so the state committed for it never exceeds that sample.

use alloc::sync::Arc;
use core::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use kspin::SpinNoIrq;
use prcmu::{Prcmu, PrcmuHal};

use crate::{
    MAX_CPUS,
    config::IdleConfig,
    cstate::{CStateTable, DEPTH_RUNNING, DEPTH_WFI, StateKind},
    error::{IdleError, IdleResult},
    platform::IdlePlatform,
    sleep::Coupled,
    state::{CpuState, IdleShared},
    stats::IdleStats,
};

/// How an idle period ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleOutcome {
    /// Depth actually entered. [`DEPTH_RUNNING`] if idle entry was abandoned.
    pub depth: usize,
    pub kind: StateKind,
    /// Time from entry to exit.
    pub slept: Duration,
}

enum SiblingWait {
    /// Every other online CPU is in WFI.
    Ready,
    /// A sibling left idle; start over.
    Woke,
    /// This CPU has an interrupt to handle.
    IrqPending,
    /// The sibling did not reach WFI in time.
    Exhausted,
}

/// Picks the idle depth.
///
/// The result is the deepest state not deeper than `governor_limit` whose
/// residency threshold fits `shortest_idle`, or WFI if that state would
/// power the APE down while it is forced on.
pub fn select_depth(
    table: &CStateTable,
    governor_limit: usize,
    shortest_idle: Option<Duration>,
    force_ape_on: bool,
) -> usize {
    let depth = table.deepest_fitting(governor_limit, shortest_idle);
    if force_ape_on && table.get(depth).powers_off_ape() {
        DEPTH_WFI.min(governor_limit)
    } else {
        depth
    }
}

/// The CPU idle controller.
pub struct CpuIdleController<H: PrcmuHal, P: IdlePlatform> {
    pub(crate) prcmu: Arc<Prcmu<H>>,
    pub(crate) platform: Arc<P>,
    pub(crate) config: IdleConfig,
    cpus: [CpuState; MAX_CPUS],
    idling: AtomicUsize,
    force_ape_on: AtomicBool,
    pub(crate) shared: SpinNoIrq<IdleShared>,
    stats: SpinNoIrq<IdleStats>,
}

impl<H: PrcmuHal, P: IdlePlatform> CpuIdleController<H, P> {
    /// Creates the controller. Every CPU starts with the deepest state allowed.
    pub fn new(prcmu: Arc<Prcmu<H>>, platform: Arc<P>, config: IdleConfig) -> IdleResult<Self> {
        config.validate()?;
        let deepest = config.table.deepest() as u8;
        info!(
            "cpuidle: {} states, {} CPUs online",
            config.table.len(),
            config.online_cpus
        );
        Ok(Self {
            prcmu,
            platform,
            force_ape_on: AtomicBool::new(config.force_ape_on),
            stats: SpinNoIrq::new(IdleStats::new(config.table.len())),
            config,
            cpus: core::array::from_fn(|_| CpuState::new(deepest)),
            idling: AtomicUsize::new(0),
            shared: SpinNoIrq::new(IdleShared::default()),
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    /// Runtime record of `cpu`.
    pub fn cpu(&self, cpu: usize) -> Option<&CpuState> {
        self.cpus[..self.config.online_cpus].get(cpu)
    }

    /// Number of CPUs currently inside [`enter_idle`](Self::enter_idle).
    pub fn idling_cpus(&self) -> usize {
        self.idling.load(Ordering::Acquire)
    }

    /// Snapshot of the idle counters.
    pub fn stats(&self) -> IdleStats {
        self.stats.lock().clone()
    }

    /// Sets the deepest depth the governor allows on `cpu`. Takes effect
    /// at the next idle entry of `cpu`.
    pub fn set_max_depth(&self, cpu: usize, depth: usize) -> IdleResult {
        let state = self.cpu(cpu).ok_or(IdleError::InvalidCpu(cpu))?;
        if depth > self.config.table.deepest() {
            return Err(IdleError::InvalidDepth(depth));
        }
        state.set_max_depth(depth);
        Ok(())
    }

    /// Sets the debug override keeping the APE domain powered.
    pub fn set_force_ape_on(&self, force: bool) {
        self.force_ape_on.store(force, Ordering::Release);
    }

    /// Whether the APE domain must stay powered: debug override or a
    /// pending AC-wake request from the modem.
    pub fn is_ape_forced_on(&self) -> bool {
        self.force_ape_on.load(Ordering::Acquire) || self.prcmu.is_ac_wake_requested()
    }

    /// Idles `cpu` until the next interrupt.
    ///
    /// `deadline` is the next scheduled wake-up of `cpu`, in
    /// [`IdlePlatform::now`] time. Called with local interrupts masked.
    pub fn enter_idle(&self, cpu: usize, deadline: Option<Duration>) -> IdleOutcome {
        if cpu >= self.config.online_cpus {
            warn!("cpuidle: CPU {cpu} is not online");
            return IdleOutcome {
                depth: DEPTH_RUNNING,
                kind: StateKind::Running,
                slept: Duration::ZERO,
            };
        }
        let online = self.config.online_cpus;
        let start = self.platform.now();
        let limit = self.cpus[cpu].max_depth();
        {
            let mut shared = self.shared.lock();
            shared.deadlines[cpu] = deadline;
            shared.restore_core[cpu] = false;
            shared.limits[cpu] = limit;
        }
        self.idling.fetch_add(1, Ordering::AcqRel);

        let wfi = DEPTH_WFI.min(limit);
        let mut depth = loop {
            if self.idling.load(Ordering::Acquire) < online || self.shared.lock().committed.is_some() {
                break wfi;
            }
            match self.wait_for_sibling(cpu) {
                SiblingWait::Ready => break self.select(),
                SiblingWait::Woke => continue,
                SiblingWait::IrqPending => {
                    debug!("cpuidle: CPU {cpu} has an interrupt pending");
                    self.stats.lock().irq_aborts += 1;
                    break DEPTH_RUNNING;
                }
                SiblingWait::Exhausted => {
                    warn!(
                        "cpuidle: sibling of CPU {cpu} not in WFI after {:?}",
                        self.config.sibling_wait_timeout
                    );
                    self.stats.lock().sibling_timeouts += 1;
                    break wfi;
                }
            }
        };

        let mut saved_core = false;
        if depth > DEPTH_WFI {
            match self.enter_coupled(cpu, depth) {
                Coupled::Completed => {
                    saved_core = self.config.table.get(depth).powers_off_arm();
                }
                Coupled::Aborted => {
                    self.stats.lock().irq_aborts += 1;
                    depth = DEPTH_RUNNING;
                }
                Coupled::FirmwareBusy => {
                    self.stats.lock().firmware_busy += 1;
                    depth = wfi;
                }
                Coupled::SiblingChanged => {
                    self.stats.lock().sibling_changes += 1;
                    depth = wfi;
                }
            }
        }
        if depth == DEPTH_WFI {
            saved_core = self.enter_wfi(cpu, limit);
        }
        self.exit(cpu, depth, start, saved_core)
    }

    fn wait_for_sibling(&self, cpu: usize) -> SiblingWait {
        let online = self.config.online_cpus;
        let start = self.platform.now();
        loop {
            if self.platform.irq_pending(cpu) {
                return SiblingWait::IrqPending;
            }
            if self.idling.load(Ordering::Acquire) < online {
                return SiblingWait::Woke;
            }
            if (0..online)
                .filter(|&c| c != cpu)
                .all(|c| self.prcmu.is_cpu_in_wfi(c))
            {
                return SiblingWait::Ready;
            }
            if self.platform.now().saturating_sub(start) >= self.config.sibling_wait_timeout {
                return SiblingWait::Exhausted;
            }
            self.platform.cpu_relax();
        }
    }

    fn select(&self) -> usize {
        let online = self.config.online_cpus;
        let now = self.platform.now();
        let (earliest, limit) = {
            let shared = self.shared.lock();
            (shared.earliest_deadline(online), shared.governor_limit(online))
        };
        let shortest = earliest.map(|d| d.saturating_sub(now));
        let depth = select_depth(&self.config.table, limit, shortest, self.is_ape_forced_on());
        debug!(
            "cpuidle: selected {} (next wake in {shortest:?})",
            self.config.table.get(depth).name
        );
        depth
    }

    /// Plain WFI. The shared domains are not touched.
    ///
    /// The core context is saved first whenever `limit` allows a state that
    /// powers the cores off, since the sibling may commit one while this
    /// CPU waits, or when the sibling already committed one. Returns
    /// whether it was saved.
    fn enter_wfi(&self, cpu: usize, limit: usize) -> bool {
        let table = &self.config.table;
        let save = {
            let mut shared = self.shared.lock();
            let joins_arm_off = shared
                .committed
                .is_some_and(|depth| table.get(depth).powers_off_arm());
            if joins_arm_off {
                shared.restore_core[cpu] = true;
            }
            joins_arm_off || table.arm_off_within(limit)
        };
        if save {
            self.platform.save_core_context(cpu);
        }
        self.platform.wait_for_interrupt(cpu);
        save
    }

    fn exit(&self, cpu: usize, depth: usize, start: Duration, saved_core: bool) -> IdleOutcome {
        let (restore_core, restore_ape, next) = {
            let mut shared = self.shared.lock();
            let (core, ape) = shared.take_restore(cpu);
            let next = shared.earliest_deadline(self.config.online_cpus);
            shared.deadlines[cpu] = None;
            if depth > DEPTH_WFI {
                shared.committed = None;
            }
            (core, ape, next)
        };
        if restore_core && saved_core {
            self.platform.restore_core_context(cpu);
        }
        if restore_ape {
            self.platform.restore_ape_context();
        }
        self.idling.fetch_sub(1, Ordering::AcqRel);
        self.platform.arm_wake_timer(cpu, next);

        let slept = self.platform.now().saturating_sub(start);
        self.cpus[cpu].set_last_depth(depth);
        self.stats.lock().record(depth, slept);
        let kind = self.config.table.get(depth).kind;
        trace!("cpuidle: CPU {cpu} left {kind} after {slept:?}");
        IdleOutcome { depth, kind, slept }
    }
}
