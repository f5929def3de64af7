//! Controller configuration

use super::clock::ClockMode;

/// Card identification clock (400 kHz)
pub const INIT_CLOCK_HZ: u32 = 400_000;

/// Default-speed data transfer clock (25 MHz)
pub const OPERATIONAL_CLOCK_HZ: u32 = 25_000_000;

/// Delay between a command slot becoming free and issuing the next command
pub const COMMAND_GAP_US: u32 = 1000;

/// Polls of a status bit before a hardware wait is declared failed
pub const SPIN_LIMIT: u32 = 1_000_000;

/// Tunables for one controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdhcConfig {
    pub initial_clock_hz: u32,
    pub operational_clock_hz: u32,
    /// Bound for reset, clock and line-free waits
    pub spin_limit: u32,
    /// Bound for a blocking submit; `None` polls until completion
    pub poll_limit: Option<u32>,
}

impl SdhcConfig {
    /// Target frequency for a clock mode
    pub fn clock_hz(&self, mode: ClockMode) -> u32 {
        match mode {
            ClockMode::Initial => self.initial_clock_hz,
            ClockMode::Operational => self.operational_clock_hz,
        }
    }
}

impl Default for SdhcConfig {
    fn default() -> Self {
        Self {
            initial_clock_hz: INIT_CLOCK_HZ,
            operational_clock_hz: OPERATIONAL_CLOCK_HZ,
            spin_limit: SPIN_LIMIT,
            poll_limit: None,
        }
    }
}
