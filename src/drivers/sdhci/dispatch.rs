//! Issuing the head command to the controller

use tock_registers::fields::FieldValue;

use super::clock::SpecVersion;
use super::command::{Command, CommandError, DataBuffer, Direction, ResponseType};
use super::platform::Platform;
use super::regs::*;
use crate::mmio::RegisterIo;
use crate::time::wait_for;

/// Interrupt sources enabled while `cmd` is in flight
pub fn interrupt_mask(cmd: &Command) -> IntStatus {
    let mut mask = IntStatus::AMBIENT | IntStatus::COMPLETION;
    if cmd.uses_pio() {
        mask |= IntStatus::BUFFER_READY;
    }
    mask
}

/// Response type, CRC check and index check bits
fn response_fields(response_type: ResponseType) -> FieldValue<u32, CMD_XFR_TYP::Register> {
    match response_type {
        ResponseType::None => CMD_XFR_TYP::RSPTYP::NoResponse,
        ResponseType::R2 => CMD_XFR_TYP::RSPTYP::Length136 + CMD_XFR_TYP::CCCEN::SET,
        ResponseType::R3 | ResponseType::R4 => CMD_XFR_TYP::RSPTYP::Length48,
        ResponseType::R1 | ResponseType::R5 | ResponseType::R6 => {
            CMD_XFR_TYP::RSPTYP::Length48 + CMD_XFR_TYP::CICEN::SET + CMD_XFR_TYP::CCCEN::SET
        }
        ResponseType::R1b | ResponseType::R5b => {
            CMD_XFR_TYP::RSPTYP::Length48Busy + CMD_XFR_TYP::CICEN::SET + CMD_XFR_TYP::CCCEN::SET
        }
    }
}

/// Program the registers for `cmd` and start it
///
/// Returns the number of buffer-ready events the data phase will raise
/// (zero for DMA or data-less commands).
pub fn issue<R: RegisterIo, P: Platform>(
    regs: &SdhcRegs<R>,
    platform: &P,
    version: SpecVersion,
    spin_limit: u32,
    cmd: &Command,
) -> Result<u32, CommandError> {
    regs.set_int_status_enable(interrupt_mask(cmd));

    if !wait_for(spin_limit, || !regs.lines_busy()) {
        log::error!("SDHC: CMD{}: command inhibit never cleared", cmd.index);
        return Err(CommandError::ControllerBusy);
    }
    if !wait_for(spin_limit, || !regs.data_line_active()) {
        log::error!("SDHC: CMD{}: data line still active", cmd.index);
        return Err(CommandError::ControllerBusy);
    }

    platform.delay_us(platform.command_gap_us());

    log::debug!("SDHC: CMD{} arg {:#010x}", cmd.index, cmd.arg);
    regs.write(CMD_ARG, cmd.arg);

    let mut xfr = CMD_XFR_TYP::CMDINX.val(u32::from(cmd.index))
        + CMD_XFR_TYP::CMDTYP::Normal
        + response_fields(cmd.response_type);
    let mut blocks_remaining = 0;
    let mut mixer_bits = 0;

    if let Some(data) = cmd.data.as_ref() {
        let read = cmd.direction() == Direction::Read;

        regs.modify(SYS_CTRL, SYS_CTRL::DTOCV.val(DATA_TIMEOUT_DTOCV));
        regs.write(
            BLK_ATT,
            (BLK_ATT::BLKSIZE.val(data.block_size) + BLK_ATT::BLKCNT.val(data.blocks)).value,
        );

        let watermark = (data.block_size / 4).min(WTMK_LVL_MAX);
        let level = if read {
            WTMK_LVL::RD_WML.val(watermark)
        } else {
            WTMK_LVL::WR_WML.val(watermark)
        };
        regs.write(WTMK_LVL, level.value);

        let mut mix = MIX_CTRL::BCEN::SET;
        if data.blocks > 1 {
            mix = mix + MIX_CTRL::MSBSEL::SET;
        }
        if read {
            mix = mix + MIX_CTRL::DTDSEL::SET;
        }
        match data.buffer {
            DataBuffer::Dma { phys } => {
                mix = mix + MIX_CTRL::DMAEN::SET;
                regs.write(DS_ADDR, phys);
            }
            DataBuffer::Pio { .. } => blocks_remaining = data.blocks,
        }

        if version >= SpecVersion::V2 {
            // Mixer bits share the low half of the transfer type register
            mixer_bits = mix.value & MIX_CTRL_XFR_MASK;
        } else {
            regs.write(MIX_CTRL, mix.value);
        }
        xfr = xfr + CMD_XFR_TYP::DPSEL::SET;
    }

    regs.write(CMD_XFR_TYP, xfr.value | mixer_bits);
    Ok(blocks_remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sdhci::command::{CMD_WRITE_BLOCK, DataDescriptor};
    use crate::drivers::sdhci::mock::{MockClockPower, MockRegs};
    use crate::drivers::sdhci::platform::GenericSdhc;
    use crate::time::NoDelay;

    fn platform() -> GenericSdhc<MockClockPower, NoDelay> {
        GenericSdhc::bcm2837(MockClockPower::new(200_000_000), NoDelay)
    }

    fn pio(words: usize) -> DataBuffer {
        DataBuffer::from_slice(std::boxed::Box::leak(std::vec![0u32; words].into_boxed_slice()))
    }

    #[test]
    fn test_plain_command_encoding() {
        let mock = MockRegs::new();
        let regs = SdhcRegs::new(&mock);
        let cmd = Command::new(8, 0x1AA, ResponseType::R1);

        let blocks = issue(&regs, &platform(), SpecVersion::V3, 16, &cmd).unwrap();

        assert_eq!(blocks, 0);
        assert_eq!(mock.get(CMD_ARG), 0x1AA);
        assert_eq!(mock.get(CMD_XFR_TYP), (8 << 24) | (1 << 20) | (1 << 19) | (2 << 16));
        assert_eq!(mock.get(INT_STATUS_EN), 0x02ff_00c3);
        // Argument goes out before the transfer type starts the command
        let writes = mock.writes();
        let arg = writes.iter().position(|(off, _)| *off == CMD_ARG).unwrap();
        let xfr = writes.iter().position(|(off, _)| *off == CMD_XFR_TYP).unwrap();
        assert!(arg < xfr);
    }

    #[test]
    fn test_response_type_bits() {
        let cases = [
            (ResponseType::None, 0),
            (ResponseType::R2, (1 << 16) | (1 << 19)),
            (ResponseType::R3, 2 << 16),
            (ResponseType::R4, 2 << 16),
            (ResponseType::R6, (2 << 16) | (1 << 19) | (1 << 20)),
            (ResponseType::R1b, (3 << 16) | (1 << 19) | (1 << 20)),
            (ResponseType::R5b, (3 << 16) | (1 << 19) | (1 << 20)),
        ];
        for (response_type, bits) in cases {
            assert_eq!(response_fields(response_type).value, bits, "{response_type:?}");
        }
    }

    #[test]
    fn test_pio_read_multi_block() {
        let mock = MockRegs::new();
        let regs = SdhcRegs::new(&mock);
        let cmd = Command::new(18, 0x800, ResponseType::R1)
            .with_data(DataDescriptor::new(512, 4, pio(512)));

        let blocks = issue(&regs, &platform(), SpecVersion::V3, 16, &cmd).unwrap();

        assert_eq!(blocks, 4);
        assert_eq!(mock.get(BLK_ATT), 512 | (4 << 16));
        assert_eq!(mock.get(WTMK_LVL), 0x80);
        assert_eq!((mock.get(SYS_CTRL) >> 16) & 0xF, 0xE);
        let xfr = mock.get(CMD_XFR_TYP);
        // BCEN | DTDSEL | MSBSEL, no DMA
        assert_eq!(xfr & 0x3F, (1 << 1) | (1 << 4) | (1 << 5));
        assert_ne!(xfr & (1 << 21), 0);
        assert_eq!(mock.get(INT_STATUS_EN), 0x02ff_00f3);
    }

    #[test]
    fn test_dma_write_single_block() {
        let mock = MockRegs::new();
        let regs = SdhcRegs::new(&mock);
        let cmd = Command::new(CMD_WRITE_BLOCK, 0x10, ResponseType::R1)
            .with_data(DataDescriptor::new(64, 1, DataBuffer::Dma { phys: 0x3000_0000 }));

        let blocks = issue(&regs, &platform(), SpecVersion::V3, 16, &cmd).unwrap();

        assert_eq!(blocks, 0);
        assert_eq!(mock.get(DS_ADDR), 0x3000_0000);
        assert_eq!(mock.get(WTMK_LVL), 16 << 16);
        assert_eq!(mock.get(CMD_XFR_TYP) & 0x3F, (1 << 1) | 1);
        // DMA transfers never enable buffer-ready interrupts
        assert_eq!(mock.get(INT_STATUS_EN) & 0x30, 0);
    }

    #[test]
    fn test_v1_controller_uses_mixer_register() {
        let mock = MockRegs::new();
        let regs = SdhcRegs::new(&mock);
        let cmd = Command::new(17, 0, ResponseType::R1)
            .with_data(DataDescriptor::new(512, 1, pio(128)));

        issue(&regs, &platform(), SpecVersion::V1, 16, &cmd).unwrap();

        assert_eq!(mock.get(MIX_CTRL), (1 << 1) | (1 << 4));
        assert_eq!(mock.get(CMD_XFR_TYP) & 0x3F, 0);
    }

    #[test]
    fn test_busy_lines_fail_dispatch() {
        let mock = MockRegs::new();
        mock.set_lines_stuck(true);
        let regs = SdhcRegs::new(&mock);
        let cmd = Command::new(0, 0, ResponseType::None);

        assert_eq!(
            issue(&regs, &platform(), SpecVersion::V3, 16, &cmd),
            Err(CommandError::ControllerBusy)
        );
        assert!(mock.writes_to(CMD_XFR_TYP).is_empty());
    }
}
