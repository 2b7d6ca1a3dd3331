// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Register operations used on the idle path: GIC coupling, WFI status,
//! wake-mask mirroring and the direct power-state request.
//!
//! Nothing here waits for an acknowledge. The power-state request in
//! particular bypasses the queued transport and fails instead of blocking
//! when mailbox 0 is in use.

use strum::FromRepr;

use crate::{
    driver::Prcmu,
    error::MailboxResult,
    hal::{
        A9_MASK_REQ_BIT, PRCM_A9_MASK_REQ, PRCM_ARM_WFI_STANDBY, PRCM_ARMITMSK31TO0, PrcmuHal,
        WAKE_MASK_WORDS, settle, wfi_standby_bit,
    },
    mailbox::{Mailbox, MailboxRequest},
    wakeup::mb0,
};

/// Power-state transitions firmware performs once all cores are in WFI.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum PowerTransition {
    /// Stay in ApExecute.
    NoChange = 0x00,
    /// ApExecute to ApSleep.
    ApSleep = 0x01,
    /// ApExecute to ApDeepSleep.
    ApDeepSleep = 0x03,
    /// ApExecute to ApIdle.
    ApIdle = 0x04,
    /// ApExecute to ApDeepIdle.
    ApDeepIdle = 0x07,
}

impl<H: PrcmuHal> Prcmu<H> {
    /// Isolates the cores from the GIC; firmware takes over wake detection.
    pub fn gic_decouple(&self) {
        let hal = self.hal();
        let val = hal.read_reg(PRCM_A9_MASK_REQ);
        hal.write_reg(PRCM_A9_MASK_REQ, val | A9_MASK_REQ_BIT);
        // Read back to make sure the write has landed before settling.
        let _ = hal.read_reg(PRCM_A9_MASK_REQ);
        settle(hal, self.config().gic_settle);
        trace!("GIC decoupled");
    }

    /// Reconnects the cores to the GIC.
    pub fn gic_recouple(&self) {
        let hal = self.hal();
        let val = hal.read_reg(PRCM_A9_MASK_REQ);
        hal.write_reg(PRCM_A9_MASK_REQ, val & !A9_MASK_REQ_BIT);
        trace!("GIC recoupled");
    }

    /// Whether the GIC is currently decoupled.
    pub fn is_gic_decoupled(&self) -> bool {
        self.hal().read_reg(PRCM_A9_MASK_REQ) & A9_MASK_REQ_BIT != 0
    }

    /// Whether `cpu` sits in WFI.
    pub fn is_cpu_in_wfi(&self, cpu: usize) -> bool {
        self.hal().read_reg(PRCM_ARM_WFI_STANDBY) & wfi_standby_bit(cpu) != 0
    }

    /// Mirrors the GIC SPI enable words into the firmware wake mask.
    pub fn copy_wake_mask(&self, enabled: &[u32; WAKE_MASK_WORDS]) {
        let hal = self.hal();
        for (i, word) in enabled.iter().enumerate() {
            hal.write_reg(PRCM_ARMITMSK31TO0 + i * 4, *word);
        }
    }

    /// Asks firmware for `transition`, to happen once every core is in WFI.
    ///
    /// Fails with [`MailboxError::Busy`](crate::MailboxError::Busy) if
    /// mailbox 0 is in use; the caller is expected to settle for a
    /// shallower state rather than wait.
    pub fn request_power_state(
        &self,
        transition: PowerTransition,
        keep_ulp_clk: bool,
        keep_ap_pll: bool,
    ) -> MailboxResult<()> {
        let mut req = MailboxRequest::new(mb0::POWER_STATE_TRANS);
        req.put_u8(mb0::REQ_AP_POWER_STATE, transition as u8)
            .put_u8(mb0::REQ_AP_PLL_STATE, keep_ap_pll as u8)
            .put_u8(mb0::REQ_ULP_CLOCK_STATE, keep_ulp_clk as u8)
            .put_u8(mb0::REQ_DO_NOT_WFI, 0);
        self.transport.try_post(Mailbox::Mb0, &req)?;
        debug!("power state {transition:?} requested (ulp: {keep_ulp_clk}, pll: {keep_ap_pll})");
        Ok(())
    }
}
