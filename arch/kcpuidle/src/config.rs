// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

use core::time::Duration;

use crate::{
    MAX_CPUS,
    cstate::CStateTable,
    error::{IdleError, IdleResult},
};

/// Configuration of the idle controller.
#[derive(Debug, Clone)]
pub struct IdleConfig {
    /// Available idle states.
    pub table: CStateTable,
    /// Number of CPUs taking part in idle coordination.
    pub online_cpus: usize,
    /// Bound on waiting for the sibling CPU to reach WFI before giving up
    /// on a coupled state.
    pub sibling_wait_timeout: Duration,
    /// Keeps the APE domain powered in every state (debug override).
    pub force_ape_on: bool,
}

impl IdleConfig {
    /// Two CPUs, the default cstate table, a 1 ms sibling wait.
    pub fn new() -> Self {
        Self {
            table: CStateTable::default(),
            online_cpus: MAX_CPUS,
            sibling_wait_timeout: Duration::from_millis(1),
            force_ape_on: false,
        }
    }

    /// Replaces the cstate table.
    pub fn with_table(mut self, table: CStateTable) -> Self {
        self.table = table;
        self
    }

    /// Sets the number of online CPUs.
    pub fn with_online_cpus(mut self, online_cpus: usize) -> Self {
        self.online_cpus = online_cpus;
        self
    }

    /// Overrides the sibling wait bound.
    pub fn with_sibling_wait_timeout(mut self, timeout: Duration) -> Self {
        self.sibling_wait_timeout = timeout;
        self
    }

    /// Sets the APE debug override.
    pub fn with_force_ape_on(mut self, force: bool) -> Self {
        self.force_ape_on = force;
        self
    }

    pub(crate) fn validate(&self) -> IdleResult {
        match self.online_cpus {
            0 => Err(IdleError::InvalidCpu(0)),
            n if n > MAX_CPUS => Err(IdleError::TooManyCpus(n)),
            _ => Ok(()),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self::new()
    }
}
