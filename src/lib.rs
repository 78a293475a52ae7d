//! CrabPi EMMC - SD/EMMC card driver for the Raspberry Pi 3
//!
//! This library implements the EMMC (Arasan SDHCI-compatible) host controller
//! driver for the BCM2835/BCM2837 SoC: card identification, block read/write,
//! erase, and the raw command path used by SDIO peripherals such as the
//! onboard WiFi chip.
//!
//! The driver is polled: completion is observed by spinning on the interrupt
//! status register, never by taking an actual interrupt. Every public
//! operation is therefore a long, uninterruptible call bounded by the timeout
//! budgets documented in [`emmc`].
//!
//! The embedding kernel provides the platform seams (MMIO access, microsecond
//! ticks, busy delay) through the [`hal::Host`] trait and installs a `log`
//! logger if it wants diagnostics.

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

pub mod emmc;
pub mod hal;
pub mod time;

pub use emmc::cmd::SdCmd;
pub use emmc::{EmmcController, SdError};
pub use hal::{Host, MmioHost};
