//! i.MX6 uSDHC clocking
//!
//! The uSDHC derives the SD clock as `base / (prescaler * (DVS + 1))`,
//! where the prescaler field holds half the prescaler value. The base
//! clock is about 200 MHz out of reset; fixed settings are used for the
//! identification and transfer phases.

use super::{ClockRequest, OCR_BIT_25, OCR_HCS, OCR_S18R, OCR_VDD_29_30, OCR_VDD_30_31, Platform};
use crate::drivers::sdhci::SdhcError;
use crate::drivers::sdhci::clock::ClockMode;
use crate::drivers::sdhci::regs::{MIX_CTRL, PRES_STATE, SYS_CTRL, SdhcRegs};
use crate::mmio::RegisterIo;
use crate::time::{Delay, wait_for};

/// i.MX6 uSDHC1..4 interrupts
pub const IMX6_USDHC_IRQS: [u32; 4] = [54 + 32, 55 + 32, 56 + 32, 57 + 32];

/// Divisor field: divide by 4
const DVS_DIV_4: u32 = 0x3;
/// Divisor field: divide by 16
const DVS_DIV_16: u32 = 0xF;
/// Prescaler field: divide by 2
const SDCLKS_PRESCALER_2: u32 = 0x01;
/// Prescaler field: divide by 32
const SDCLKS_PRESCALER_32: u32 = 0x10;
/// Data timeout of SDCLK x 2^14
const DTOCV_2_POW_14: u32 = 0x0;
/// Data timeout of SDCLK x 2^29
const DTOCV_2_POW_29: u32 = 0xF;

/// Clock settings for one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClockSetting {
    dvs: u32,
    sdclks: u32,
    dtocv: u32,
}

impl ClockSetting {
    fn for_mode(mode: ClockMode) -> Self {
        match mode {
            // base / 512
            ClockMode::Initial => Self {
                dvs: DVS_DIV_16,
                sdclks: SDCLKS_PRESCALER_32,
                dtocv: DTOCV_2_POW_14,
            },
            // base / 8
            ClockMode::Operational => Self {
                dvs: DVS_DIV_4,
                sdclks: SDCLKS_PRESCALER_2,
                dtocv: DTOCV_2_POW_29,
            },
        }
    }
}

/// i.MX6 Ultra Secured Digital Host Controller
pub struct Imx6Usdhc<D> {
    delay: D,
}

impl<D: Delay> Imx6Usdhc<D> {
    pub fn new(delay: D) -> Self {
        Self { delay }
    }

    fn enable_internal_clock<R: RegisterIo>(
        &self,
        regs: &SdhcRegs<R>,
        spin_limit: u32,
    ) -> Result<(), SdhcError> {
        regs.modify(SYS_CTRL, SYS_CTRL::CLK_INT_EN::SET);
        if !wait_for(spin_limit, || {
            regs.sys_ctrl().is_set(SYS_CTRL::CLK_INT_STABLE)
        }) {
            log::error!("SDHC: uSDHC internal clock not stable");
            return Err(SdhcError::ClockUnstable);
        }
        regs.modify(SYS_CTRL, SYS_CTRL::CLK_CARD_EN::SET);
        Ok(())
    }
}

impl<D: Delay> Platform for Imx6Usdhc<D> {
    fn name(&self) -> &'static str {
        "imx6-usdhc"
    }

    fn set_clock<R: RegisterIo>(
        &self,
        regs: &SdhcRegs<R>,
        request: ClockRequest,
    ) -> Result<(), SdhcError> {
        if !regs.sys_ctrl().is_set(SYS_CTRL::CLK_INT_EN) {
            self.enable_internal_clock(regs, request.spin_limit)?;
        }

        if !regs.present_state().is_set(PRES_STATE::SDSTB) {
            log::error!("SDHC: SD clock unstable, refusing to change it");
            return Err(SdhcError::ClockUnstable);
        }

        let setting = ClockSetting::for_mode(request.mode);
        // The prescaler applies twice per cycle in dual data rate mode
        let sdclks = if regs.mix_ctrl().is_set(MIX_CTRL::DDR_EN) {
            setting.sdclks >> 1
        } else {
            setting.sdclks
        };

        regs.modify(
            SYS_CTRL,
            SYS_CTRL::SDCLKS.val(sdclks)
                + SYS_CTRL::DVS.val(setting.dvs)
                + SYS_CTRL::DTOCV.val(setting.dtocv),
        );

        log::debug!(
            "SDHC: uSDHC {:?} clock, prescaler {:#x}, divisor {}",
            request.mode,
            sdclks,
            setting.dvs + 1
        );
        Ok(())
    }

    fn delay_us(&self, us: u32) {
        self.delay.delay_us(us);
    }

    fn card_voltage_window(&self, host_supports_3v3: bool, card_ocr: u32) -> u32 {
        let window = OCR_VDD_29_30 | OCR_VDD_30_31;
        if host_supports_3v3 && card_ocr & window != 0 {
            window | OCR_HCS | OCR_BIT_25 | OCR_S18R
        } else {
            window
        }
    }
}
