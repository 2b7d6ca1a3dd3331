// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! The PRCMU driver instance shared by all of its clients.

use alloc::{collections::VecDeque, sync::Arc};

use kspin::SpinNoIrq;

use crate::{
    config::PrcmuConfig,
    dispatch::DeferredWork,
    hal::PrcmuHal,
    mailbox::MailboxTransport,
    wakeup::WakeupLog,
};

/// One PRCMU: the mailbox transport plus the protocol state kept on the
/// application side.
///
/// Clients hold it behind an [`Arc`]; the interrupt line is owned by
/// whoever calls [`handle_irq`](Prcmu::handle_irq).
pub struct Prcmu<H: PrcmuHal> {
    pub(crate) transport: MailboxTransport<H>,
    pub(crate) wakeups: SpinNoIrq<WakeupLog>,
    pub(crate) deferred: SpinNoIrq<VecDeque<DeferredWork>>,
    /// AC-wake references; the host access request bit is only touched
    /// with this lock held.
    pub(crate) ac_wake_refs: SpinNoIrq<u32>,
    pub(crate) last_transition_status: SpinNoIrq<Option<u8>>,
}

impl<H: PrcmuHal> Prcmu<H> {
    /// Creates the driver over `hal`.
    pub fn new(hal: Arc<H>, config: PrcmuConfig) -> Self {
        info!("Initialize PRCMU mailbox driver...");
        Self {
            transport: MailboxTransport::new(hal, config),
            wakeups: SpinNoIrq::new(WakeupLog::new()),
            deferred: SpinNoIrq::new(VecDeque::new()),
            ac_wake_refs: SpinNoIrq::new(0),
            last_transition_status: SpinNoIrq::new(None),
        }
    }

    /// The mailbox transport.
    #[inline]
    pub fn transport(&self) -> &MailboxTransport<H> {
        &self.transport
    }

    /// The hardware accessor.
    #[inline]
    pub fn hal(&self) -> &H {
        self.transport.hal()
    }

    /// The configuration in use.
    #[inline]
    pub fn config(&self) -> &PrcmuConfig {
        self.transport.config()
    }
}
