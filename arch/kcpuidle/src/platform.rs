// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! What the idle path needs from the CPU and interrupt layers.

use core::time::Duration;

use prcmu::WAKE_MASK_WORDS;

/// CPU-side services used while entering and leaving idle.
///
/// Every method is called on the CPU it names, with local interrupts
/// masked; `wait_for_interrupt` returns once an interrupt is pending even
/// though it is not taken.
pub trait IdlePlatform: Send + Sync {
    /// Monotonic time, in the same base as the wake deadlines.
    fn now(&self) -> Duration;

    /// Whether an interrupt is pending for `cpu` at the GIC.
    fn irq_pending(&self, cpu: usize) -> bool;

    /// Fills `mask` with the enabled shared peripheral interrupts.
    fn enabled_irq_mask(&self, mask: &mut [u32; WAKE_MASK_WORDS]);

    /// Saves the core registers of `cpu` and the resume vector.
    fn save_core_context(&self, cpu: usize);

    /// Restores what [`save_core_context`](Self::save_core_context) saved.
    fn restore_core_context(&self, cpu: usize);

    /// Saves the state of the APE peripherals that lose power.
    fn save_ape_context(&self);

    /// Restores what [`save_ape_context`](Self::save_ape_context) saved.
    fn restore_ape_context(&self);

    /// Executes the wait-for-interrupt instruction on `cpu`.
    fn wait_for_interrupt(&self, cpu: usize);

    /// Programs the local wake timer of `cpu`. `None` stops it.
    fn arm_wake_timer(&self, cpu: usize, deadline: Option<Duration>);

    /// Programs the always-on timer that survives APE power-down.
    fn arm_always_on_timer(&self, deadline: Option<Duration>);

    /// Called on every iteration of the sibling wait.
    fn cpu_relax(&self) {
        core::hint::spin_loop();
    }
}
