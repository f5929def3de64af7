//! SD clock divider calculation
//!
//! Controllers up to version 2 have an 8-bit divided clock field that only
//! accepts powers of two; version 3 widened it to 10 bits with any even
//! divisor. In both encodings a field value `d` divides the base clock by
//! `2 * d`, and `d == 0` passes the base clock through.

use tock_registers::fields::FieldValue;

use super::SdhcError;
use super::regs::SYS_CTRL;

/// Largest 8-bit divided clock value (divide by 256)
pub const MAX_DIVIDER_V2: u16 = 0x80;

/// Largest 10-bit divided clock value (divide by 2046)
pub const MAX_DIVIDER_V3: u16 = 0x3FF;

/// Host controller specification version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpecVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl SpecVersion {
    /// Decode the raw version field (0 = version 1)
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::V1,
            1 => Self::V2,
            _ => Self::V3,
        }
    }

    pub fn number(self) -> u32 {
        self as u32
    }

    /// Version 3 and newer use the 10-bit divided clock
    pub fn has_10bit_divider(self) -> bool {
        self >= Self::V3
    }
}

/// Which clock a reset or mode switch should program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Card identification clock
    Initial,
    /// Data transfer clock
    Operational,
}

/// An encoded divided clock value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    value: u16,
}

impl ClockDivider {
    /// Pass the base clock through undivided
    pub const BYPASS: Self = Self { value: 0 };

    /// Low 8 bits of the divided clock value
    pub fn freq_select(self) -> u8 {
        (self.value & 0xFF) as u8
    }

    /// Bits 9:8 of the divided clock value (version 3 only)
    pub fn upper_bits(self) -> u8 {
        ((self.value >> 8) & 0x3) as u8
    }

    /// Frequency select and upper bits as a system control field value
    pub fn field(self) -> FieldValue<u32, SYS_CTRL::Register> {
        SYS_CTRL::SDCLKS.val(u32::from(self.freq_select()))
            + SYS_CTRL::SDCLK_UPPER.val(u32::from(self.upper_bits()))
    }

    /// Register image: frequency select at bits 15:8, upper bits at 7:6
    pub fn bits(self) -> u32 {
        self.field().value
    }

    /// Effective division ratio
    pub fn divisor(self) -> u32 {
        if self.value == 0 {
            1
        } else {
            2 * u32::from(self.value)
        }
    }

    /// Clock frequency produced from `base_clock_hz`
    pub fn effective_hz(self, base_clock_hz: u32) -> u32 {
        base_clock_hz / self.divisor()
    }
}

/// Pick the divided clock value closest to, and not above, `target_hz`
///
/// When even the largest divider cannot get down to the target, the
/// largest divider is used and the resulting clock is above the target.
pub fn compute_divider(
    base_clock_hz: u32,
    target_hz: u32,
    version: SpecVersion,
) -> Result<ClockDivider, SdhcError> {
    if target_hz == 0 {
        return Err(SdhcError::InvalidParameter);
    }

    let ratio = base_clock_hz.div_ceil(target_hz);
    if ratio <= 1 {
        return Ok(ClockDivider::BYPASS);
    }

    let value = if version.has_10bit_divider() {
        let d = ratio.div_ceil(2);
        d.min(u32::from(MAX_DIVIDER_V3)) as u16
    } else {
        let mut d: u32 = 1;
        while 2 * d < ratio && d < u32::from(MAX_DIVIDER_V2) {
            d <<= 1;
        }
        d as u16
    };

    let divider = ClockDivider { value };
    log::trace!(
        "SDHC: divider for {} Hz from {} Hz: {:#x} (actual {} Hz)",
        target_hz,
        base_clock_hz,
        value,
        divider.effective_hz(base_clock_hz)
    );
    Ok(divider)
}
