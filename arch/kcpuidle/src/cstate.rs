// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Idle state (cstate) descriptors.
//!
//! A depth is an index into a [`CStateTable`]. Depth 0 is always running and
//! depth 1 always plain WFI; everything deeper involves the PRCMU and the
//! shared power domains.

use alloc::vec::Vec;
use core::time::Duration;

use prcmu::PowerTransition;
use strum::Display;

use crate::error::{IdleError, IdleResult};

/// Depth of the running state.
pub const DEPTH_RUNNING: usize = 0;
/// Depth of the plain WFI state.
pub const DEPTH_WFI: usize = 1;

/// Broad class of an idle state, ordered by depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum StateKind {
    Running,
    Wfi,
    Idle,
    Sleep,
    DeepIdle,
    DeepSleep,
}

/// ARM core power while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    On,
    Retention,
    /// Core registers are lost and must be saved.
    Off,
}

/// APE (application) domain power while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApeState {
    On,
    /// Peripheral context is lost and must be saved.
    Off,
}

/// State of a PLL while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PllState {
    On,
    Off,
}

/// ESRAM power while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsramState {
    On,
    Retention,
    Off,
}

/// What every domain does in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainStates {
    pub arm: ArmState,
    pub arm_pll: PllState,
    pub ape: ApeState,
    pub ul_pll: PllState,
    pub esram: EsramState,
}

impl DomainStates {
    /// Everything powered.
    pub const ALL_ON: Self = Self {
        arm: ArmState::On,
        arm_pll: PllState::On,
        ape: ApeState::On,
        ul_pll: PllState::On,
        esram: EsramState::On,
    };

    /// Whether the combination can exist in hardware.
    fn is_consistent(&self) -> bool {
        // The APE cannot go down while a core keeps running on its clocks,
        // and the UL PLL feeds the APE.
        let ape_ok = self.ape == ApeState::On || self.arm != ArmState::On;
        let ul_ok = self.ul_pll == PllState::On || self.ape == ApeState::Off;
        let pll_ok = self.arm_pll == PllState::On || self.arm != ArmState::On;
        ape_ok && ul_ok && pll_ok
    }
}

/// One idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CState {
    pub name: &'static str,
    pub kind: StateKind,
    pub domains: DomainStates,
    /// Request sent to firmware on entry. [`PowerTransition::NoChange`] for
    /// states handled by the core alone.
    pub transition: PowerTransition,
    pub entry_latency: Duration,
    pub exit_latency: Duration,
    /// Minimum expected idle time for the state to pay off.
    pub target_residency: Duration,
}

impl CState {
    /// Whether entering the state needs the PRCMU.
    #[inline]
    pub fn is_coupled(&self) -> bool {
        self.kind > StateKind::Wfi
    }

    /// Whether the APE domain goes down.
    #[inline]
    pub fn powers_off_ape(&self) -> bool {
        self.domains.ape == ApeState::Off
    }

    /// Whether the ARM cores lose their context.
    #[inline]
    pub fn powers_off_arm(&self) -> bool {
        self.domains.arm == ArmState::Off
    }
}

const fn us(n: u64) -> Duration {
    Duration::from_micros(n)
}

const fn cstate(
    name: &'static str,
    kind: StateKind,
    domains: DomainStates,
    transition: PowerTransition,
    latency: (u64, u64),
    residency: u64,
) -> CState {
    CState {
        name,
        kind,
        domains,
        transition,
        entry_latency: us(latency.0),
        exit_latency: us(latency.1),
        target_residency: us(residency),
    }
}

/// Idle states of the DB8500-class SoC.
pub const DEFAULT_CSTATES: [CState; 7] = [
    cstate("running", StateKind::Running, DomainStates::ALL_ON, PowerTransition::NoChange, (0, 0), 0),
    cstate("wfi", StateKind::Wfi, DomainStates::ALL_ON, PowerTransition::NoChange, (0, 0), 0),
    cstate(
        "ApIdle",
        StateKind::Idle,
        DomainStates {
            arm: ArmState::Retention,
            ..DomainStates::ALL_ON
        },
        PowerTransition::ApIdle,
        (40, 50),
        150,
    ),
    cstate(
        "ApSleep",
        StateKind::Sleep,
        DomainStates {
            arm: ArmState::Retention,
            arm_pll: PllState::Off,
            ape: ApeState::Off,
            ul_pll: PllState::On,
            esram: EsramState::Retention,
        },
        PowerTransition::ApSleep,
        (140, 160),
        500,
    ),
    cstate(
        "ApSleep, UL PLL off",
        StateKind::Sleep,
        DomainStates {
            arm: ArmState::Retention,
            arm_pll: PllState::Off,
            ape: ApeState::Off,
            ul_pll: PllState::Off,
            esram: EsramState::Retention,
        },
        PowerTransition::ApSleep,
        (150, 250),
        800,
    ),
    cstate(
        "ApDeepIdle",
        StateKind::DeepIdle,
        DomainStates {
            arm: ArmState::Off,
            ..DomainStates::ALL_ON
        },
        PowerTransition::ApDeepIdle,
        (400, 650),
        1500,
    ),
    cstate(
        "ApDeepSleep",
        StateKind::DeepSleep,
        DomainStates {
            arm: ArmState::Off,
            arm_pll: PllState::Off,
            ape: ApeState::Off,
            ul_pll: PllState::Off,
            esram: EsramState::Off,
        },
        PowerTransition::ApDeepSleep,
        (1500, 2500),
        4000,
    ),
];

/// A validated, immutable cstate table.
#[derive(Debug, Clone)]
pub struct CStateTable {
    states: Vec<CState>,
    /// Shallowest depth that powers the ARM cores off.
    arm_off_from: Option<usize>,
}

impl CStateTable {
    /// Validates `states` and builds the table.
    ///
    /// Depth 0 must be running and depth 1 WFI, both without a firmware
    /// transition. Kinds and residency thresholds must not decrease with
    /// depth, and every deeper state needs a transition.
    pub fn new(states: &[CState]) -> IdleResult<Self> {
        if states.len() < 2 {
            return Err(IdleError::InvalidTable("needs running and WFI"));
        }
        if states.len() > u8::MAX as usize {
            return Err(IdleError::InvalidTable("too many states"));
        }
        if states[DEPTH_RUNNING].kind != StateKind::Running || states[DEPTH_WFI].kind != StateKind::Wfi {
            return Err(IdleError::InvalidTable("depth 0 must be running, depth 1 WFI"));
        }
        for pair in states.windows(2) {
            if pair[1].kind < pair[0].kind {
                return Err(IdleError::InvalidTable("kinds out of order"));
            }
            if pair[1].target_residency < pair[0].target_residency {
                return Err(IdleError::InvalidTable("residency thresholds out of order"));
            }
        }
        for s in states {
            if !s.domains.is_consistent() {
                return Err(IdleError::InvalidTable("impossible domain combination"));
            }
            let needs_fw = s.is_coupled();
            if needs_fw != (s.transition != PowerTransition::NoChange) {
                return Err(IdleError::InvalidTable("transition does not match state kind"));
            }
            if !needs_fw && s.domains != DomainStates::ALL_ON {
                return Err(IdleError::InvalidTable("uncoupled state powers a domain down"));
            }
        }
        Ok(Self {
            states: states.to_vec(),
            arm_off_from: states.iter().position(CState::powers_off_arm),
        })
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false: a valid table has at least two states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Deepest depth.
    pub fn deepest(&self) -> usize {
        self.states.len() - 1
    }

    /// State at `depth`, clamped to the deepest state.
    pub fn get(&self, depth: usize) -> &CState {
        &self.states[depth.min(self.deepest())]
    }

    /// Iterates over the states from running to the deepest.
    pub fn iter(&self) -> impl Iterator<Item = &CState> {
        self.states.iter()
    }

    /// Whether any state up to `depth` powers the ARM cores off.
    pub fn arm_off_within(&self, depth: usize) -> bool {
        self.arm_off_from.is_some_and(|d| d <= depth)
    }

    /// Deepest depth not deeper than `limit` whose residency threshold fits
    /// in `idle`. `None` means no wake-up is scheduled.
    pub fn deepest_fitting(&self, limit: usize, idle: Option<Duration>) -> usize {
        let limit = limit.min(self.deepest());
        match idle {
            None => limit,
            Some(idle) => (DEPTH_WFI..=limit)
                .rev()
                .find(|&d| self.states[d].target_residency <= idle)
                .unwrap_or(DEPTH_WFI.min(limit)),
        }
    }
}

impl Default for CStateTable {
    fn default() -> Self {
        Self {
            states: DEFAULT_CSTATES.to_vec(),
            arm_off_from: DEFAULT_CSTATES.iter().position(CState::powers_off_arm),
        }
    }
}
