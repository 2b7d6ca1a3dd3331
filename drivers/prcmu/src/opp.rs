// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! ARM and APE operating points over mailbox 1.

use strum::FromRepr;

use crate::{
    driver::Prcmu,
    error::{MailboxError, PrcmuError, PrcmuResult},
    hal::PrcmuHal,
    mailbox::{Mailbox, MailboxRequest},
};

/// Mailbox 1 op code for an ARM/APE operating-point change.
pub const MB1H_ARM_APE_OPP: u8 = 0x0;

/// Acknowledge offsets of mailbox 1.
pub const ACK_MB1_CURRENT_ARM_OPP: usize = 0x0;
pub const ACK_MB1_CURRENT_APE_OPP: usize = 0x1;

/// ARM operating points.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum ArmOpp {
    NoChange = 0x01,
    Opp100 = 0x02,
    Opp50 = 0x03,
    OppMax = 0x04,
    MaxFreq100 = 0x05,
    ExtClk = 0x07,
}

/// APE operating points.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum ApeOpp {
    NoChange = 0x01,
    Opp100 = 0x02,
    Opp50 = 0x03,
}

impl TryFrom<u8> for ArmOpp {
    type Error = PrcmuError;

    fn try_from(raw: u8) -> PrcmuResult<Self> {
        ArmOpp::from_repr(raw).ok_or(PrcmuError::InvalidArgument)
    }
}

impl TryFrom<u8> for ApeOpp {
    type Error = PrcmuError;

    fn try_from(raw: u8) -> PrcmuResult<Self> {
        ApeOpp::from_repr(raw).ok_or(PrcmuError::InvalidArgument)
    }
}

/// Operating points in effect after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OppStatus {
    pub arm: ArmOpp,
    pub ape: ApeOpp,
}

impl<H: PrcmuHal> Prcmu<H> {
    /// Requests new operating points.
    ///
    /// Mailbox 1 carries no status byte: firmware answers with the ARM
    /// operating point now in effect, and a request it refused shows up as
    /// a different one.
    pub fn set_opp(&self, arm: ArmOpp, ape: ApeOpp) -> PrcmuResult<OppStatus> {
        let req = MailboxRequest::with_payload(MB1H_ARM_APE_OPP, &[arm as u8, ape as u8]);
        let ack = self.transport.send(Mailbox::Mb1, &req)?;
        let current_arm = ack.byte(ACK_MB1_CURRENT_ARM_OPP);
        if arm != ArmOpp::NoChange && current_arm != arm as u8 {
            warn!("ARM OPP {arm:?} refused, firmware reports {current_arm:#04x}");
            return Err(MailboxError::Nacked(current_arm).into());
        }
        let status = OppStatus {
            arm: ArmOpp::try_from(current_arm)?,
            ape: ApeOpp::try_from(ack.byte(ACK_MB1_CURRENT_APE_OPP))?,
        };
        debug!("OPP now {status:?}");
        Ok(status)
    }

    /// Requests new operating points given as raw firmware codes.
    ///
    /// Unknown codes are rejected before any hardware access.
    pub fn set_opp_raw(&self, arm: u8, ape: u8) -> PrcmuResult<OppStatus> {
        let arm = ArmOpp::try_from(arm)?;
        let ape = ApeOpp::try_from(ape)?;
        self.set_opp(arm, ape)
    }
}
