//! Platform seams for the EMMC driver
//!
//! The driver core never touches hardware directly; everything goes through
//! the [`Host`] trait: register access into the EMMC block, a free-running
//! microsecond counter, and a busy delay. [`MmioHost`] implements the trait
//! against the BCM2837 peripheral window; the unit tests substitute a
//! simulated controller.

use core::ptr;

/// Default ARM-side peripheral base on the BCM2837 (Raspberry Pi 3).
pub const BCM2837_PERIPHERAL_BASE: usize = 0x3F00_0000;

/// EMMC register block offset from the peripheral base.
pub const EMMC_OFFSET: usize = 0x30_0000;

/// System timer register block offset from the peripheral base.
pub const SYSTIMER_OFFSET: usize = 0x3000;

/// System timer counter low word (CLO) offset within the timer block.
const SYSTIMER_CLO: usize = 0x04;

/// System timer counter high word (CHI) offset within the timer block.
const SYSTIMER_CHI: usize = 0x08;

/// Hardware access seam for the EMMC driver.
///
/// `read_reg`/`write_reg` take byte offsets into the EMMC register block
/// (see [`crate::emmc::regs`]). `ticks` is a free-running microsecond
/// counter; callers difference it with wrapping arithmetic, so wraparound is
/// harmless.
pub trait Host {
    fn read_reg(&self, offset: u32) -> u32;
    fn write_reg(&mut self, offset: u32, value: u32);

    /// Free-running microsecond tick counter.
    fn ticks(&self) -> u64;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&self, us: u32) {
        let start = self.ticks();
        while self.ticks().wrapping_sub(start) < us as u64 {
            core::hint::spin_loop();
        }
    }
}

/// [`Host`] backed by the memory-mapped BCM2837 peripheral window.
pub struct MmioHost {
    emmc_base: usize,
    timer_base: usize,
}

impl MmioHost {
    /// Host at the default Raspberry Pi 3 peripheral base.
    pub const fn new() -> Self {
        Self::with_base(BCM2837_PERIPHERAL_BASE)
    }

    /// Host at a non-default peripheral base (e.g. 0x2000_0000 on the
    /// original BCM2835 boards).
    pub const fn with_base(peripheral_base: usize) -> Self {
        Self {
            emmc_base: peripheral_base + EMMC_OFFSET,
            timer_base: peripheral_base + SYSTIMER_OFFSET,
        }
    }
}

impl Default for MmioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MmioHost {
    fn read_reg(&self, offset: u32) -> u32 {
        unsafe { ptr::read_volatile((self.emmc_base + offset as usize) as *const u32) }
    }

    fn write_reg(&mut self, offset: u32, value: u32) {
        unsafe { ptr::write_volatile((self.emmc_base + offset as usize) as *mut u32, value) }
    }

    fn ticks(&self) -> u64 {
        // CHI can roll over between the two 32-bit reads; re-read until the
        // high word is stable.
        loop {
            let hi = unsafe { ptr::read_volatile((self.timer_base + SYSTIMER_CHI) as *const u32) };
            let lo = unsafe { ptr::read_volatile((self.timer_base + SYSTIMER_CLO) as *const u32) };
            let hi2 = unsafe { ptr::read_volatile((self.timer_base + SYSTIMER_CHI) as *const u32) };
            if hi == hi2 {
                return ((hi as u64) << 32) | lo as u64;
            }
        }
    }
}
