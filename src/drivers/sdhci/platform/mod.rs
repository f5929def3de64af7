//! Controller families
//!
//! The command engine is identical across SoCs; what differs is how the
//! SD clock is derived and programmed, how long the controller needs
//! between commands, and which card voltages the board supports. Each
//! family implements [`Platform`] for those points.

pub mod generic;
pub mod imx6;

pub use generic::GenericSdhc;
pub use imx6::Imx6Usdhc;

use super::SdhcError;
use super::clock::{ClockMode, SpecVersion};
use super::config::COMMAND_GAP_US;
use super::regs::SdhcRegs;
use crate::mmio::RegisterIo;
use crate::services::ClockPowerService;

// ============================================================================
// OCR Voltage Window Bits
// ============================================================================

/// 2.9V - 3.0V
pub const OCR_VDD_29_30: u32 = 1 << 17;

/// 3.0V - 3.1V
pub const OCR_VDD_30_31: u32 = 1 << 18;

/// 3.1V - 3.2V
pub const OCR_VDD_31_32: u32 = 1 << 19;

/// 3.2V - 3.3V
pub const OCR_VDD_32_33: u32 = 1 << 20;

/// 3.3V - 3.4V
pub const OCR_VDD_33_34: u32 = 1 << 21;

/// Switching to 1.8V request
pub const OCR_S18R: u32 = 1 << 24;

/// Bit 25 of the host OCR (set together with S18R on uSDHC hosts)
pub const OCR_BIT_25: u32 = 1 << 25;

/// Host capacity support (SDHC/SDXC)
pub const OCR_HCS: u32 = 1 << 30;

/// A clock programming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRequest {
    pub mode: ClockMode,
    /// Desired SD clock frequency
    pub target_hz: u32,
    pub version: SpecVersion,
    /// Bound for each hardware wait
    pub spin_limit: u32,
}

/// Per-family controller behaviour
pub trait Platform {
    /// Short family name for diagnostics
    fn name(&self) -> &'static str;

    /// Program the SD clock
    fn set_clock<R: RegisterIo>(
        &self,
        regs: &SdhcRegs<R>,
        request: ClockRequest,
    ) -> Result<(), SdhcError>;

    /// Busy-wait for `us` microseconds
    fn delay_us(&self, us: u32);

    /// Quiescence delay before each command
    fn command_gap_us(&self) -> u32 {
        COMMAND_GAP_US
    }

    /// OCR voltage window the host offers the card
    fn card_voltage_window(&self, host_supports_3v3: bool, card_ocr: u32) -> u32;
}

/// Power and reset steps performed before the controller is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BringUp {
    /// Device to switch on through the power service
    pub power_device: Option<u32>,
    /// Reset line to pulse
    pub reset_id: Option<u32>,
}

/// Power the SD block on and pulse its reset line
pub fn bring_up<S: ClockPowerService + ?Sized>(
    service: &S,
    steps: BringUp,
) -> Result<(), SdhcError> {
    if let Some(device) = steps.power_device {
        if !service.set_power_state(device, true) {
            log::error!("SDHC: device {} did not power on", device);
            return Err(SdhcError::PowerFailed);
        }
        log::debug!("SDHC: device {} powered on", device);
    }

    if let Some(reset) = steps.reset_id {
        service.assert_reset(reset).map_err(|e| {
            log::error!("SDHC: assert reset {} failed: {:?}", reset, e);
            SdhcError::ResetControl
        })?;
        service.deassert_reset(reset).map_err(|e| {
            log::error!("SDHC: deassert reset {} failed: {:?}", reset, e);
            SdhcError::ResetControl
        })?;
    }

    Ok(())
}
