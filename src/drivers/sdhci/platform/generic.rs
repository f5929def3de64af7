//! Standard clock control (Broadcom Arasan EMMC and similar)
//!
//! The SD clock is derived from a base clock reported by the firmware and
//! programmed through the SDHC 3.00 clock control sequence:
//!
//! 1. stop the SD clock if it is running
//! 2. write the divided clock value together with internal clock enable
//! 3. wait for the internal clock to report stable
//! 4. start the SD clock
//!
//! The controller is given time to release the CMD/DAT lines between steps.

use super::{BringUp, ClockRequest, OCR_HCS, OCR_VDD_29_30, OCR_VDD_30_31, OCR_VDD_31_32};
use super::{OCR_VDD_32_33, OCR_VDD_33_34, Platform, bring_up};
use crate::drivers::sdhci::SdhcError;
use crate::drivers::sdhci::clock::compute_divider;
use crate::drivers::sdhci::regs::{SYS_CTRL, SdhcRegs};
use crate::mmio::RegisterIo;
use crate::services::ClockPowerService;
use crate::time::{Delay, wait_for};

/// Firmware clock id of the BCM2837 EMMC controller
pub const BCM2837_CLOCK_ID_EMMC: u32 = 1;

/// Firmware clock id of the BCM2711 EMMC2 controller
pub const BCM2711_CLOCK_ID_EMMC2: u32 = 12;

/// BCM2837 SDHC interrupt
pub const BCM2837_SDHC_IRQ: u32 = 126;

/// BCM2711 EMMC2 interrupt
pub const BCM2711_SDHC_IRQ: u32 = 158;

/// Firmware power domain of the SD card
pub const DEVICE_ID_SD_CARD: u32 = 0;

/// A controller whose SD clock divides a firmware-managed base clock
pub struct GenericSdhc<S, D> {
    service: S,
    delay: D,
    clock_id: u32,
    irq: u32,
    bring_up: BringUp,
}

impl<S: ClockPowerService, D: Delay> GenericSdhc<S, D> {
    pub fn new(service: S, delay: D, clock_id: u32, irq: u32, bring_up: BringUp) -> Self {
        Self {
            service,
            delay,
            clock_id,
            irq,
            bring_up,
        }
    }

    /// Raspberry Pi 3 (BCM2837) Arasan controller
    pub fn bcm2837(service: S, delay: D) -> Self {
        Self::new(
            service,
            delay,
            BCM2837_CLOCK_ID_EMMC,
            BCM2837_SDHC_IRQ,
            BringUp {
                power_device: Some(DEVICE_ID_SD_CARD),
                reset_id: None,
            },
        )
    }

    /// Raspberry Pi 4 (BCM2711) EMMC2 controller
    pub fn bcm2711(service: S, delay: D) -> Self {
        Self::new(
            service,
            delay,
            BCM2711_CLOCK_ID_EMMC2,
            BCM2711_SDHC_IRQ,
            BringUp {
                power_device: Some(DEVICE_ID_SD_CARD),
                reset_id: None,
            },
        )
    }

    /// Interrupt line of this controller
    pub fn irq(&self) -> u32 {
        self.irq
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Switch the SD block on before the controller is initialised
    pub fn power_on(&self) -> Result<(), SdhcError> {
        bring_up(&self.service, self.bring_up)
    }

    fn wait_lines_free<R: RegisterIo>(
        &self,
        regs: &SdhcRegs<R>,
        spin_limit: u32,
    ) -> Result<(), SdhcError> {
        if wait_for(spin_limit, || !regs.lines_busy()) {
            Ok(())
        } else {
            log::error!("SDHC: CMD/DAT lines stuck busy");
            Err(SdhcError::LineBusy)
        }
    }
}

impl<S: ClockPowerService, D: Delay> Platform for GenericSdhc<S, D> {
    fn name(&self) -> &'static str {
        "generic-sdhc"
    }

    fn set_clock<R: RegisterIo>(
        &self,
        regs: &SdhcRegs<R>,
        request: ClockRequest,
    ) -> Result<(), SdhcError> {
        let base_clock = self.service.base_clock_hz(self.clock_id).map_err(|e| {
            log::error!("SDHC: base clock {} unavailable: {:?}", self.clock_id, e);
            SdhcError::ClockService
        })?;
        let divider = compute_divider(base_clock, request.target_hz, request.version)?;

        self.wait_lines_free(regs, request.spin_limit)?;

        if regs.sys_ctrl().is_set(SYS_CTRL::CLK_CARD_EN) {
            regs.modify(SYS_CTRL, SYS_CTRL::CLK_CARD_EN::CLEAR);
            self.wait_lines_free(regs, request.spin_limit)?;
        }

        regs.modify(SYS_CTRL, SYS_CTRL::CLK_INT_EN::SET + divider.field());
        self.wait_lines_free(regs, request.spin_limit)?;

        if !wait_for(request.spin_limit, || {
            regs.sys_ctrl().is_set(SYS_CTRL::CLK_INT_STABLE)
        }) {
            log::error!("SDHC: internal clock not stable");
            return Err(SdhcError::ClockUnstable);
        }

        regs.modify(SYS_CTRL, SYS_CTRL::CLK_CARD_EN::SET);
        self.wait_lines_free(regs, request.spin_limit)?;

        log::debug!(
            "SDHC: {:?} clock {} Hz (base {} Hz, divider {:#x})",
            request.mode,
            divider.effective_hz(base_clock),
            base_clock,
            divider.bits()
        );
        Ok(())
    }

    fn delay_us(&self, us: u32) {
        self.delay.delay_us(us);
    }

    fn card_voltage_window(&self, _host_supports_3v3: bool, _card_ocr: u32) -> u32 {
        OCR_HCS | OCR_VDD_33_34 | OCR_VDD_32_33 | OCR_VDD_31_32 | OCR_VDD_30_31 | OCR_VDD_29_30
    }
}
