// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Reference-counted clock tree.
//!
//! A clock may depend on a bus parent (the cluster clock its registers sit
//! behind) and a parent (its source). Enabling a clock from zero enables the
//! bus parent, then the parent, then the clock itself. Disabling to zero
//! reverses that order. The parent chain is walked with an explicit stack so
//! a deep table cannot exhaust the kernel stack.

use alloc::{sync::Arc, vec, vec::Vec};

use spin::Mutex;

use crate::{
    driver::Prcmu,
    error::{PrcmuError, PrcmuResult},
    hal::{CLK_MGT_CLKEN, PrcmuHal},
    mailbox::{Mailbox, MailboxRequest},
};

/// Mailbox 3 op code for a system clock request.
pub const MB3H_SYSCLK: u8 = 0x0E;
/// Offset of the system clock request byte in the mailbox 3 payload.
pub const REQ_MB3_SYSCLK_MGT: usize = 0x16C;

/// PRCC peripheral clock enable register.
pub const PRCC_PCKEN: usize = 0x0;
/// PRCC peripheral clock disable register.
pub const PRCC_PCKDIS: usize = 0x4;
/// PRCC kernel clock enable register.
pub const PRCC_KCKEN: usize = 0x8;
/// PRCC kernel clock disable register.
pub const PRCC_KCKDIS: usize = 0xC;

/// Clocks generated by the PRCMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrcmuClock {
    /// The system clock, requested through mailbox 3.
    SysClk,
    SgaClk,
    UartClk,
    Msp02Clk,
    I2cClk,
    SdmmcClk,
    Per1Clk,
    Per2Clk,
    Per3Clk,
    Per5Clk,
    Per6Clk,
}

impl PrcmuClock {
    /// Offset of the `PRCM_xxxCLK_MGT` register, for clocks gated by register.
    pub const fn mgt_offset(self) -> Option<usize> {
        match self {
            PrcmuClock::SysClk => None,
            PrcmuClock::SgaClk => Some(0x014),
            PrcmuClock::UartClk => Some(0x018),
            PrcmuClock::Msp02Clk => Some(0x01C),
            PrcmuClock::I2cClk => Some(0x020),
            PrcmuClock::SdmmcClk => Some(0x024),
            PrcmuClock::Per1Clk => Some(0x02C),
            PrcmuClock::Per2Clk => Some(0x030),
            PrcmuClock::Per3Clk => Some(0x034),
            PrcmuClock::Per5Clk => Some(0x038),
            PrcmuClock::Per6Clk => Some(0x03C),
        }
    }
}

/// How a clock is switched in hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOps {
    /// Always running; only the reference count moves.
    Fixed,
    /// Gated by the PRCMU.
    Prcmu(PrcmuClock),
    /// Peripheral (bus) clock gate of a PRCC cluster.
    PrccPeripheral { cluster: u8, bit: u8 },
    /// Kernel (functional) clock gate of a PRCC cluster.
    PrccKernel { cluster: u8, bit: u8 },
}

/// Access to the PRCC clock gate blocks, one per peripheral cluster.
pub trait PrccHal: Send + Sync {
    /// Writes `mask` to the register at `offset` of cluster `cluster`.
    fn write_gate(&self, cluster: u8, offset: usize, mask: u32);
}

/// Static description of one clock, as found in a board table.
#[derive(Debug, Clone, Copy)]
pub struct ClockDesc {
    pub name: &'static str,
    pub ops: ClockOps,
    pub parent: Option<&'static str>,
    pub bus_parent: Option<&'static str>,
}

impl ClockDesc {
    /// Describes a clock without parents.
    pub const fn new(name: &'static str, ops: ClockOps) -> Self {
        Self {
            name,
            ops,
            parent: None,
            bus_parent: None,
        }
    }

    /// Sets the source clock.
    pub const fn with_parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the bus clock.
    pub const fn with_bus_parent(mut self, bus_parent: &'static str) -> Self {
        self.bus_parent = Some(bus_parent);
        self
    }
}

/// Handle of a clock in a [`ClockTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockId(usize);

#[derive(Debug)]
struct ClockEntry {
    name: &'static str,
    ops: ClockOps,
    parent: Option<ClockId>,
    bus_parent: Option<ClockId>,
}

/// A validated clock tree: names unique, parents known, no cycles.
#[derive(Debug)]
pub struct ClockTable {
    entries: Vec<ClockEntry>,
}

impl ClockTable {
    /// Resolves and validates `descs`.
    pub fn new(descs: &[ClockDesc]) -> PrcmuResult<Self> {
        let find = |name: &str| descs.iter().position(|d| d.name == name).map(ClockId);
        let mut entries = Vec::with_capacity(descs.len());
        for (i, desc) in descs.iter().enumerate() {
            if find(desc.name) != Some(ClockId(i)) {
                warn!("clock {} defined twice", desc.name);
                return Err(PrcmuError::InvalidArgument);
            }
            let resolve = |name: Option<&'static str>| match name {
                None => Ok(None),
                Some(n) => find(n).map(Some).ok_or_else(|| {
                    warn!("clock {}: unknown parent {n}", desc.name);
                    PrcmuError::UnknownClock
                }),
            };
            entries.push(ClockEntry {
                name: desc.name,
                ops: desc.ops,
                parent: resolve(desc.parent)?,
                bus_parent: resolve(desc.bus_parent)?,
            });
        }
        let table = Self { entries };
        table.check_acyclic()?;
        Ok(table)
    }

    /// Number of clocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a clock by name.
    pub fn lookup(&self, name: &str) -> Option<ClockId> {
        self.entries.iter().position(|e| e.name == name).map(ClockId)
    }

    /// Name of `id`.
    pub fn name(&self, id: ClockId) -> &'static str {
        self.entries[id.0].name
    }

    fn parents(&self, id: ClockId) -> impl Iterator<Item = ClockId> + '_ {
        let e = &self.entries[id.0];
        e.bus_parent.into_iter().chain(e.parent)
    }

    fn check_acyclic(&self) -> PrcmuResult {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut marks = vec![Mark::New; self.entries.len()];
        for root in 0..self.entries.len() {
            if marks[root] != Mark::New {
                continue;
            }
            // (node, parents already pushed)
            let mut stack = vec![(ClockId(root), false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    marks[id.0] = Mark::Done;
                    continue;
                }
                match marks[id.0] {
                    Mark::Done => continue,
                    Mark::Open => {
                        warn!("clock {} is its own ancestor", self.name(id));
                        return Err(PrcmuError::InvalidArgument);
                    }
                    Mark::New => {}
                }
                marks[id.0] = Mark::Open;
                stack.push((id, true));
                for p in self.parents(id) {
                    if marks[p.0] == Mark::Open {
                        warn!("clock {} is its own ancestor", self.name(p));
                        return Err(PrcmuError::InvalidArgument);
                    }
                    if marks[p.0] == Mark::New {
                        stack.push((p, false));
                    }
                }
            }
        }
        Ok(())
    }
}

enum Step {
    Visit(ClockId),
    Switch(ClockId),
}

/// The clock framework backend.
pub struct ClockService<H: PrcmuHal, P: PrccHal> {
    prcmu: Arc<Prcmu<H>>,
    prcc: Arc<P>,
    table: ClockTable,
    counts: Mutex<Vec<u32>>,
}

impl<H: PrcmuHal, P: PrccHal> ClockService<H, P> {
    /// Creates the service with every clock off.
    pub fn new(prcmu: Arc<Prcmu<H>>, prcc: Arc<P>, table: ClockTable) -> Self {
        let counts = Mutex::new(vec![0; table.len()]);
        Self {
            prcmu,
            prcc,
            table,
            counts,
        }
    }

    /// The clock table.
    pub fn table(&self) -> &ClockTable {
        &self.table
    }

    /// Looks up a clock by name.
    pub fn lookup(&self, name: &str) -> PrcmuResult<ClockId> {
        self.table.lookup(name).ok_or(PrcmuError::UnknownClock)
    }

    /// Current reference count of `id`.
    pub fn ref_count(&self, id: ClockId) -> u32 {
        self.counts.lock().get(id.0).copied().unwrap_or(0)
    }

    /// Whether `id` is switched on.
    pub fn is_enabled(&self, id: ClockId) -> bool {
        self.ref_count(id) > 0
    }

    /// Takes a reference on `id`, switching it and its ancestors on as needed.
    ///
    /// If any hardware switch fails, the ones already done by this call are
    /// undone and no reference count changes.
    pub fn enable(&self, id: ClockId) -> PrcmuResult {
        self.check_id(id)?;
        let mut counts = self.counts.lock();
        let mut delta = vec![0u32; counts.len()];
        let mut order = Vec::new();
        let mut stack = vec![Step::Visit(id)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(c) => {
                    delta[c.0] += 1;
                    if counts[c.0] + delta[c.0] > 1 {
                        continue;
                    }
                    stack.push(Step::Switch(c));
                    let e = &self.table.entries[c.0];
                    // Popped in reverse: bus parent first, then parent.
                    if let Some(p) = e.parent {
                        stack.push(Step::Visit(p));
                    }
                    if let Some(b) = e.bus_parent {
                        stack.push(Step::Visit(b));
                    }
                }
                Step::Switch(c) => order.push(c),
            }
        }

        for (done, &c) in order.iter().enumerate() {
            if let Err(err) = self.switch(c, true) {
                warn!("clock {}: enable failed: {err}", self.table.name(c));
                for &undo in order[..done].iter().rev() {
                    if let Err(err) = self.switch(undo, false) {
                        warn!("clock {}: rollback failed: {err}", self.table.name(undo));
                    }
                }
                return Err(err);
            }
        }
        for (count, d) in counts.iter_mut().zip(delta) {
            *count += d;
        }
        Ok(())
    }

    /// Drops a reference on `id`, switching it and its ancestors off when
    /// their counts reach zero.
    ///
    /// Hardware failures while switching off are logged; the counts still
    /// drop and the first error is returned.
    pub fn disable(&self, id: ClockId) -> PrcmuResult {
        self.check_id(id)?;
        let mut counts = self.counts.lock();
        if counts[id.0] == 0 {
            warn!("clock {}: disable without enable", self.table.name(id));
            return Err(PrcmuError::InvalidArgument);
        }
        let mut delta = vec![0u32; counts.len()];
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(c) = stack.pop() {
            delta[c.0] += 1;
            if counts[c.0] > delta[c.0] {
                continue;
            }
            order.push(c);
            let e = &self.table.entries[c.0];
            // Popped in reverse: parent first, then bus parent.
            if let Some(b) = e.bus_parent {
                stack.push(b);
            }
            if let Some(p) = e.parent {
                stack.push(p);
            }
        }

        let mut result = Ok(());
        for &c in &order {
            if let Err(err) = self.switch(c, false) {
                warn!("clock {}: disable failed: {err}", self.table.name(c));
                result = result.and(Err(err));
            }
        }
        for (count, d) in counts.iter_mut().zip(delta) {
            *count = count.saturating_sub(d);
        }
        result
    }

    fn check_id(&self, id: ClockId) -> PrcmuResult {
        if id.0 < self.table.len() {
            Ok(())
        } else {
            Err(PrcmuError::InvalidArgument)
        }
    }

    fn switch(&self, id: ClockId, on: bool) -> PrcmuResult {
        let entry = &self.table.entries[id.0];
        trace!("clock {}: {}", entry.name, if on { "on" } else { "off" });
        match entry.ops {
            ClockOps::Fixed => Ok(()),
            ClockOps::Prcmu(PrcmuClock::SysClk) => {
                let mut req = MailboxRequest::new(MB3H_SYSCLK);
                req.put_u8(REQ_MB3_SYSCLK_MGT, on as u8);
                self.prcmu.transport().send(Mailbox::Mb3, &req)?;
                Ok(())
            }
            ClockOps::Prcmu(clk) => {
                let Some(offset) = clk.mgt_offset() else {
                    return Err(PrcmuError::InvalidArgument);
                };
                let hal = self.prcmu.hal();
                let val = hal.read_reg(offset);
                let val = if on {
                    val | CLK_MGT_CLKEN
                } else {
                    val & !CLK_MGT_CLKEN
                };
                hal.write_reg(offset, val);
                Ok(())
            }
            ClockOps::PrccPeripheral { cluster, bit } => {
                let reg = if on { PRCC_PCKEN } else { PRCC_PCKDIS };
                self.prcc.write_gate(cluster, reg, 1 << bit);
                Ok(())
            }
            ClockOps::PrccKernel { cluster, bit } => {
                let reg = if on { PRCC_KCKEN } else { PRCC_KCKDIS };
                self.prcc.write_gate(cluster, reg, 1 << bit);
                Ok(())
            }
        }
    }
}
