//! Interrupt handling
//!
//! One pass of [`Sdhc::handle_irq`] reads and acknowledges the status
//! register and advances the head command:
//!
//! - any error bit fails the command and completes it at once
//! - command complete captures the response; data-less commands finish here
//! - buffer read/write ready moves one block through the data port
//! - a data command finishes once both command complete and transfer
//!   complete have been seen, in either order
//!
//! A finished command is unlinked, the next one is issued, and only then is
//! the finished one handed back, so a callback may submit more work.

use super::clock::SpecVersion;
use super::command::{CMD_STOP_TRANSMISSION, CommandError, DataBuffer, Direction, ResponseType};
use super::platform::Platform;
use super::queue::InFlight;
use super::regs::*;
use super::Sdhc;
use crate::mmio::RegisterIo;
use crate::services::DmaAllocator;

/// Error bits in increasing order of precedence
const ERROR_CLASSES: [(IntStatus, CommandError); 13] = [
    (IntStatus::TNE, CommandError::Tuning),
    (IntStatus::OVRCURE, CommandError::Overcurrent),
    (IntStatus::AC12E, CommandError::AutoCmd12),
    (IntStatus::DMAE, CommandError::Dma),
    (IntStatus::ADMAE, CommandError::Adma),
    (IntStatus::DEBE, CommandError::DataEndBit),
    (IntStatus::DCE, CommandError::DataCrc),
    (IntStatus::DTOE, CommandError::DataTimeout),
    (IntStatus::CIE, CommandError::CommandIndex),
    (IntStatus::CEBE, CommandError::CommandEndBit),
    (IntStatus::CCE, CommandError::CommandCrc),
    (IntStatus::CTOE, CommandError::CommandTimeout),
    (IntStatus::CRM, CommandError::CardRemoved),
];

/// Status bits that are only reported
const INFORMATIONAL: IntStatus = IntStatus::TP
    .union(IntStatus::RTE)
    .union(IntStatus::CINT)
    .union(IntStatus::CINS)
    .union(IntStatus::DINT)
    .union(IntStatus::BGE);

/// Map error bits to the failure they report
///
/// When several bits are set the most specific one wins: card removal over
/// command errors over data errors over engine errors. The generic error
/// bit alone reads as a transfer error.
pub fn classify(status: IntStatus) -> Option<CommandError> {
    let specific = ERROR_CLASSES
        .iter()
        .filter(|(bit, _)| status.contains(*bit))
        .map(|(_, err)| *err)
        .last();

    match specific {
        Some(err) => Some(err),
        None if status.contains(IntStatus::ERR) => Some(CommandError::Transfer),
        None => None,
    }
}

/// Read the response registers for the head command
fn capture_response<R: RegisterIo>(regs: &SdhcRegs<R>, entry: &mut InFlight) {
    let cmd = &mut entry.cmd;
    match cmd.response_type {
        ResponseType::None => {}
        ResponseType::R2 => {
            for (i, word) in cmd.response.iter_mut().enumerate() {
                *word = regs.read(CMD_RSP0 + 4 * i);
            }
        }
        // Auto/manual CMD12 busy responses land in the last response word
        ResponseType::R1b if cmd.index == CMD_STOP_TRANSMISSION => {
            cmd.response[3] = regs.read(CMD_RSP3);
        }
        _ => cmd.response[0] = regs.read(CMD_RSP0),
    }
}

/// Move one block between the data port and the PIO buffer
fn transfer_block<R: RegisterIo>(regs: &SdhcRegs<R>, entry: &mut InFlight) {
    let direction = entry.cmd.direction();
    let Some(data) = entry.cmd.data.as_ref() else {
        return;
    };
    let DataBuffer::Pio { ptr, words } = data.buffer else {
        return;
    };

    let start = entry.pio_offset;
    let end = (start + data.block_words()).min(words);
    for i in start..end {
        // SAFETY: `i < words`, and the buffer belongs to the command until
        // it completes (see `DataBuffer::from_slice`/`from_raw`)
        unsafe {
            let word = ptr.as_ptr().add(i);
            match direction {
                Direction::Read => word.write_volatile(regs.read(DATA_BUFF_ACC_PORT)),
                Direction::Write => regs.write(DATA_BUFF_ACC_PORT, word.read_volatile()),
            }
        }
    }
    log::trace!("SDHC: CMD{} PIO words {}..{}", entry.cmd.index, start, end);
    entry.pio_offset = end;
}

impl<R: RegisterIo, P: Platform, A: DmaAllocator> Sdhc<R, P, A> {
    /// Service the controller
    ///
    /// Called from the interrupt path, and in a loop by blocking
    /// submissions. Safe to call with nothing pending: a status of zero
    /// does nothing, and events with no command in flight are logged and
    /// dropped.
    pub fn handle_irq(&mut self) {
        let status = self.regs.int_status();
        if status.is_empty() {
            return;
        }
        self.regs.ack_int_status(status);

        let info = status & INFORMATIONAL;
        if !info.is_empty() {
            log::debug!("SDHC: status {:?}", info);
            if info.contains(IntStatus::CINS) {
                log::info!("SDHC: card inserted");
            }
        }

        let Some(entry) = self.queue.head_mut() else {
            if status.intersects(IntStatus::ERRORS | IntStatus::COMPLETION | IntStatus::BUFFER_READY) {
                log::trace!("SDHC: spurious interrupt {:#010x} with no command", status.bits());
            }
            return;
        };

        let mut finished = false;

        if let Some(err) = classify(status) {
            entry.cmd.record_errors(status & (IntStatus::ERRORS | IntStatus::CRM));
            if status.contains(IntStatus::CC) {
                capture_response(&self.regs, entry);
            }
            log::error!(
                "SDHC: CMD{} failed: {:?} (status {:#010x})",
                entry.cmd.index,
                err,
                status.bits()
            );
            entry.cmd.fail(err);
            finished = true;
        } else {
            if status.contains(IntStatus::CC) {
                capture_response(&self.regs, entry);
                entry.command_done = true;
                if entry.cmd.data.is_none() {
                    entry.cmd.succeed();
                    finished = true;
                }
            }

            if status.intersects(IntStatus::BUFFER_READY) && !finished {
                if self.blocks_remaining > 0 && entry.cmd.uses_pio() {
                    transfer_block(&self.regs, entry);
                    self.blocks_remaining -= 1;
                } else {
                    log::warn!("SDHC: CMD{}: unexpected buffer ready", entry.cmd.index);
                }
            }

            if status.contains(IntStatus::TC) && !finished && entry.cmd.data.is_some() {
                entry.data_done = true;
                if !entry.command_done {
                    log::debug!("SDHC: CMD{}: transfer complete before response", entry.cmd.index);
                }
            }

            if !finished && entry.command_done && entry.data_done {
                if self.blocks_remaining > 0 {
                    log::warn!(
                        "SDHC: CMD{} complete with {} block(s) untransferred",
                        entry.cmd.index,
                        self.blocks_remaining
                    );
                }
                entry.cmd.succeed();
                finished = true;
            }
        }

        if finished {
            self.blocks_remaining = 0;
            if let Some(entry) = self.queue.pop() {
                let failed = self.issue_head();
                self.deliver(entry);
                if let Some(failed) = failed {
                    self.deliver(failed);
                }
                self.dispatch_next();
            }
        }
    }

    /// Whether the controller latches the transfer mode in its own register
    pub fn has_separate_mixer(&self) -> bool {
        self.version == SpecVersion::V1
    }
}
