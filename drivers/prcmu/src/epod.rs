// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Power-domain (EPOD) control over mailbox 2.
//!
//! Firmware only switches domains off or on. RAM retention is tracked on
//! this side: the domain is switched off in hardware but remembered as
//! retained, so moving between OFF and RAM-RETENTION costs no traffic and a
//! later ON request is a warm restart.

use alloc::sync::Arc;

use spin::Mutex;
use strum::{EnumCount, EnumIter, FromRepr};

use crate::{
    driver::Prcmu,
    error::{PrcmuError, PrcmuResult},
    hal::PrcmuHal,
    mailbox::{Mailbox, MailboxRequest},
};

/// Mailbox 2 op code for a domain power-state change.
pub const MB2H_DPS: u8 = 0x0;

/// Firmware encoding of a domain that keeps its state.
const EPOD_FW_NO_CHANGE: u8 = 0x00;
/// Firmware encoding of a powered-off domain.
const EPOD_FW_OFF: u8 = 0x01;
/// Firmware encoding of a powered-on domain.
const EPOD_FW_ON: u8 = 0x04;

/// Independently power-gateable domains.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumIter, EnumCount)]
pub enum EpodId {
    SvaMmdsp = 0,
    SvaPipe = 1,
    SiaMmdsp = 2,
    SiaPipe = 3,
    Sga = 4,
    B2r2Mcde = 5,
    Esram12 = 6,
    Esram34 = 7,
}

impl EpodId {
    /// Whether the domain has RAM that can be retained while off.
    pub const fn supports_ram_retention(self) -> bool {
        matches!(self, EpodId::Esram12 | EpodId::Esram34)
    }
}

/// Requested state of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpodState {
    #[default]
    Off,
    RamRetention,
    On,
}

impl EpodState {
    const fn firmware_code(self) -> u8 {
        match self {
            EpodState::On => EPOD_FW_ON,
            EpodState::Off | EpodState::RamRetention => EPOD_FW_OFF,
        }
    }

    const fn is_powered(self) -> bool {
        matches!(self, EpodState::On)
    }
}

/// Domain control with a shadow of the last acknowledged state per domain.
pub struct EpodPowerController<H: PrcmuHal> {
    prcmu: Arc<Prcmu<H>>,
    shadow: Mutex<[EpodState; EpodId::COUNT]>,
}

impl<H: PrcmuHal> EpodPowerController<H> {
    /// Creates the controller. All domains are assumed off, as after boot.
    pub fn new(prcmu: Arc<Prcmu<H>>) -> Self {
        Self::with_initial(prcmu, [EpodState::Off; EpodId::COUNT])
    }

    /// Creates the controller with a known initial state per domain.
    pub fn with_initial(prcmu: Arc<Prcmu<H>>, initial: [EpodState; EpodId::COUNT]) -> Self {
        Self {
            prcmu,
            shadow: Mutex::new(initial),
        }
    }

    /// Last acknowledged state of `domain`.
    pub fn state(&self, domain: EpodId) -> EpodState {
        self.shadow.lock()[domain as usize]
    }

    /// Moves `domain` to `target`.
    ///
    /// No request is issued when the shadow already matches, or when only
    /// the retention bookkeeping changes. The shadow is updated only after
    /// firmware acknowledged the change.
    pub fn set_domain(&self, domain: EpodId, target: EpodState) -> PrcmuResult {
        if target == EpodState::RamRetention && !domain.supports_ram_retention() {
            return Err(PrcmuError::InvalidArgument);
        }
        let mut shadow = self.shadow.lock();
        let current = shadow[domain as usize];
        if current == target {
            trace!("EPOD {domain:?} already {target:?}");
            return Ok(());
        }
        if current.is_powered() || target.is_powered() {
            let mut req = MailboxRequest::with_payload(MB2H_DPS, &[EPOD_FW_NO_CHANGE; EpodId::COUNT]);
            req.put_u8(domain as usize, target.firmware_code());
            self.prcmu.transport().send(Mailbox::Mb2, &req)?;
        }
        debug!("EPOD {domain:?}: {current:?} -> {target:?}");
        shadow[domain as usize] = target;
        Ok(())
    }
}
