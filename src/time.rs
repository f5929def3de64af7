//! Busy-wait helpers
//!
//! The driver runs without a timer service, so every wait is either a
//! calibrated spin ([`SpinDelay`]) or a poll bounded by an iteration count
//! ([`wait_for`]).

/// Microsecond delays
pub trait Delay {
    /// Busy-wait for at least `us` microseconds
    fn delay_us(&self, us: u32);
}

/// Delay by spinning a fixed number of iterations per microsecond
#[derive(Debug, Clone, Copy)]
pub struct SpinDelay {
    spins_per_us: u32,
}

impl SpinDelay {
    /// Roughly calibrated for a 1 GHz core
    pub const DEFAULT_SPINS_PER_US: u32 = 100;

    pub const fn new(spins_per_us: u32) -> Self {
        Self { spins_per_us }
    }
}

impl Default for SpinDelay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SPINS_PER_US)
    }
}

impl Delay for SpinDelay {
    fn delay_us(&self, us: u32) {
        let spins = u64::from(us) * u64::from(self.spins_per_us);
        for _ in 0..spins {
            core::hint::spin_loop();
        }
    }
}

/// No delay at all (simulation and tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_us(&self, _us: u32) {}
}

/// Poll `condition` up to `limit` times
///
/// Returns `true` as soon as the condition holds, `false` if the limit ran
/// out first. The condition is always evaluated at least once.
pub fn wait_for<F: FnMut() -> bool>(limit: u32, mut condition: F) -> bool {
    for _ in 0..limit.max(1) {
        if condition() {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_for_succeeds_after_polls() {
        let mut polls = 0;
        assert!(wait_for(10, || {
            polls += 1;
            polls == 3
        }));
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_wait_for_exhausts_limit() {
        let mut polls = 0;
        assert!(!wait_for(5, || {
            polls += 1;
            false
        }));
        assert_eq!(polls, 5);
    }

    #[test]
    fn test_wait_for_zero_limit_polls_once() {
        let mut polls = 0;
        assert!(wait_for(0, || {
            polls += 1;
            true
        }));
        assert_eq!(polls, 1);
    }
}
