// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Register-level access to the PRCMU block and its shared TCDM memory.

use core::{ptr, time::Duration};

use bitflags::bitflags;

/// Doorbell value register: bit `n` stays set while mailbox `n` is owned by firmware.
pub const PRCM_MBOX_CPU_VAL: usize = 0x0FC;
/// Doorbell set register: writing bit `n` hands mailbox `n` to firmware.
pub const PRCM_MBOX_CPU_SET: usize = 0x100;
/// Wake-mask registers mirroring the GIC SPI enable words, four consecutive words.
pub const PRCM_ARMITMSK31TO0: usize = 0x11C;
/// WFI standby status of the application cores.
pub const PRCM_ARM_WFI_STANDBY: usize = 0x130;
/// GIC decouple request.
pub const PRCM_A9_MASK_REQ: usize = 0x328;
/// GIC decouple acknowledge.
pub const PRCM_A9_MASK_ACK: usize = 0x32C;
/// Host access (AC-wake) request towards the modem side.
pub const PRCM_HOSTACCESS_REQ: usize = 0x334;
/// Acknowledge clear register: writing bit `n` clears the pending acknowledge of mailbox `n`.
pub const PRCM_ARM_IT1_CLR: usize = 0x48C;
/// Acknowledge status register: bit `n` set means mailbox `n` has an acknowledge pending.
pub const PRCM_ARM_IT1_VAL: usize = 0x494;

/// Decouple bit in [`PRCM_A9_MASK_REQ`].
pub const A9_MASK_REQ_BIT: u32 = 1 << 0;
/// Request bit in [`PRCM_HOSTACCESS_REQ`].
pub const HOSTACCESS_REQ_BIT: u32 = 1 << 0;
/// Clock enable bit in every `PRCM_xxxCLK_MGT` register.
pub const CLK_MGT_CLKEN: u32 = 1 << 8;

/// Number of 32-bit words in the firmware wake-mask bank.
pub const WAKE_MASK_WORDS: usize = 4;

/// Returns the WFI standby bit of `cpu` in [`PRCM_ARM_WFI_STANDBY`].
#[inline]
pub const fn wfi_standby_bit(cpu: usize) -> u32 {
    1 << (8 + cpu)
}

bitflags! {
    /// One bit per hardware mailbox, as laid out in the doorbell and acknowledge registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MailboxBits: u32 {
        const MB0 = 1 << 0;
        const MB1 = 1 << 1;
        const MB2 = 1 << 2;
        const MB3 = 1 << 3;
        const MB4 = 1 << 4;
        const MB5 = 1 << 5;
        const MB6 = 1 << 6;
        const MB7 = 1 << 7;
    }
}

/// Raw accessors used by every PRCMU service.
///
/// Register offsets are relative to the PRCMU register block, TCDM offsets
/// to the base of the shared tightly-coupled data memory.
pub trait PrcmuHal: Send + Sync {
    /// Reads a 32-bit PRCMU register.
    fn read_reg(&self, offset: usize) -> u32;
    /// Writes a 32-bit PRCMU register.
    fn write_reg(&self, offset: usize, value: u32);
    /// Reads one byte of TCDM.
    fn tcdm_read(&self, offset: usize) -> u8;
    /// Writes one byte of TCDM.
    fn tcdm_write(&self, offset: usize, value: u8);
    /// Monotonic time used to bound every wait.
    fn now(&self) -> Duration;

    /// Called on every iteration of a busy-wait.
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// Reads `buf.len()` bytes of TCDM starting at `offset`.
    fn tcdm_read_bytes(&self, offset: usize, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.tcdm_read(offset + i);
        }
    }

    /// Writes `data` to TCDM starting at `offset`.
    fn tcdm_write_bytes(&self, offset: usize, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.tcdm_write(offset + i, *b);
        }
    }
}

/// Memory-mapped PRCMU on the real SoC.
pub struct MmioPrcmu {
    prcmu_base: usize,
    tcdm_base: usize,
    clock: fn() -> Duration,
}

impl MmioPrcmu {
    /// Creates an accessor for the given mapped register block and TCDM.
    ///
    /// # Safety
    ///
    /// Both bases must be valid device mappings for the lifetime of the
    /// returned value, and `clock` must be monotonic.
    pub const unsafe fn new(prcmu_base: usize, tcdm_base: usize, clock: fn() -> Duration) -> Self {
        Self {
            prcmu_base,
            tcdm_base,
            clock,
        }
    }
}

impl PrcmuHal for MmioPrcmu {
    fn read_reg(&self, offset: usize) -> u32 {
        unsafe { ptr::read_volatile((self.prcmu_base + offset) as *const u32) }
    }

    fn write_reg(&self, offset: usize, value: u32) {
        trace!("PRCMU write {offset:#05x} <- {value:#010x}");
        unsafe { ptr::write_volatile((self.prcmu_base + offset) as *mut u32, value) }
    }

    fn tcdm_read(&self, offset: usize) -> u8 {
        unsafe { ptr::read_volatile((self.tcdm_base + offset) as *const u8) }
    }

    fn tcdm_write(&self, offset: usize, value: u8) {
        unsafe { ptr::write_volatile((self.tcdm_base + offset) as *mut u8, value) }
    }

    fn now(&self) -> Duration {
        (self.clock)()
    }
}

/// Busy-waits on `hal` for at least `delay`.
pub(crate) fn settle<H: PrcmuHal + ?Sized>(hal: &H, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    let start = hal.now();
    while hal.now().saturating_sub(start) < delay {
        hal.relax();
    }
}
