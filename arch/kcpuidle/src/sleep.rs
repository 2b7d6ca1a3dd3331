// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Entry into the coupled states: the GIC is decoupled, wake-up routing is
//! handed to firmware, and the power-state request is committed before the
//! final WFI.
//!
//! Once the GIC is decoupled, either firmware has been given the transition
//! or the GIC is coupled again before returning. [`DecoupledGic`] recouples
//! on drop so that no exit path can leave the cores isolated.

use prcmu::{Prcmu, PrcmuHal, WAKE_MASK_WORDS};

use crate::{controller::CpuIdleController, cstate::PllState, platform::IdlePlatform};

/// Result of a coupled state attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coupled {
    /// Firmware took the transition and the CPU woke up again.
    Completed,
    /// An interrupt became pending while decoupling; nothing was committed.
    Aborted,
    /// Mailbox 0 was in use; nothing was committed.
    FirmwareBusy,
    /// The sibling committed a state first, or re-entered idle with a limit
    /// below `depth`; nothing was committed.
    SiblingChanged,
}

/// Keeps the GIC decoupled for its lifetime.
pub struct DecoupledGic<'a, H: PrcmuHal> {
    prcmu: &'a Prcmu<H>,
}

impl<'a, H: PrcmuHal> DecoupledGic<'a, H> {
    /// Decouples the GIC from the cores.
    pub fn new(prcmu: &'a Prcmu<H>) -> Self {
        prcmu.gic_decouple();
        Self { prcmu }
    }
}

impl<H: PrcmuHal> Drop for DecoupledGic<'_, H> {
    fn drop(&mut self) {
        self.prcmu.gic_recouple();
    }
}

impl<H: PrcmuHal, P: IdlePlatform> CpuIdleController<H, P> {
    pub(crate) fn enter_coupled(&self, cpu: usize, depth: usize) -> Coupled {
        let state = *self.config.table.get(depth);
        let platform = &*self.platform;
        let online = self.config.online_cpus;
        if self.shared.lock().committed.is_some() {
            return Coupled::SiblingChanged;
        }
        let gic = DecoupledGic::new(&*self.prcmu);

        // An interrupt that arrived while decoupling would not wake us.
        if platform.irq_pending(cpu) {
            debug!("cpuidle: CPU {cpu} interrupted while decoupling, {} aborted", state.name);
            return Coupled::Aborted;
        }

        let mut mask = [0u32; WAKE_MASK_WORDS];
        platform.enabled_irq_mask(&mut mask);
        self.prcmu.copy_wake_mask(&mask);

        let ape_off = state.powers_off_ape();
        let arm_off = state.powers_off_arm();
        if ape_off {
            platform.save_ape_context();
        }
        if arm_off {
            platform.save_core_context(cpu);
        }
        let wake_at = {
            let mut shared = self.shared.lock();
            // The siblings decided on their context save at entry, against
            // the limit they sampled then.
            if shared.committed.is_some() || depth > shared.governor_limit(online) {
                debug!("cpuidle: sibling of CPU {cpu} changed, {} dropped", state.name);
                return Coupled::SiblingChanged;
            }
            shared.committed = Some(depth);
            shared.ape_restore_pending |= ape_off;
            if arm_off {
                // Restore is only done by CPUs that saved.
                shared.restore_core[..online].fill(true);
            }
            shared.earliest_deadline(online)
        };
        if ape_off {
            platform.arm_always_on_timer(wake_at);
        }

        let keep_ulp = state.domains.ul_pll == PllState::On;
        let keep_pll = state.domains.arm_pll == PllState::On;
        if let Err(err) = self
            .prcmu
            .request_power_state(state.transition, keep_ulp, keep_pll)
        {
            warn!("cpuidle: {} not committed: {err}", state.name);
            self.shared.lock().clear_restore();
            return Coupled::FirmwareBusy;
        }

        platform.wait_for_interrupt(cpu);
        drop(gic);
        Coupled::Completed
    }
}
