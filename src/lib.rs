//! sdhc-drivers - SD/MMC host controller driver core
//!
//! An interrupt-driven command engine for 32-bit SD host controllers
//! (i.MX6 uSDHC, Broadcom Arasan EMMC/EMMC2), meant to sit under an SD/MMC
//! card protocol stack in firmware or a microkernel driver process.
//!
//! The crate is `no_std` and allocation free. Hardware access goes through
//! [`mmio::RegisterIo`]; clocks, power and DMA memory come from the
//! embedding system through the traits in [`services`].

#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod logger;
pub mod mmio;
pub mod services;
pub mod time;

pub use drivers::sdhci::{Sdhc, SdhcError, SdioHost, SharedHost};
