//! Hardware drivers
//!
//! Only SD host controllers for now.

pub mod sdhci;
