//! Commands, data descriptors and completion results

use core::ptr::NonNull;

use super::SdhcError;
use super::queue::Ticket;
use super::regs::IntStatus;
use crate::services::DmaRegion;

/// STOP_TRANSMISSION; its R1b response lands in the last response word
pub const CMD_STOP_TRANSMISSION: u8 = 12;

/// READ_SINGLE_BLOCK
pub const CMD_READ_SINGLE_BLOCK: u8 = 17;

/// READ_MULTIPLE_BLOCK
pub const CMD_READ_MULTIPLE_BLOCK: u8 = 18;

/// WRITE_BLOCK
pub const CMD_WRITE_BLOCK: u8 = 24;

/// WRITE_MULTIPLE_BLOCK
pub const CMD_WRITE_MULTIPLE_BLOCK: u8 = 25;

/// Largest block count the block attribute register can hold
pub const MAX_BLOCK_COUNT: u32 = 0xFFFF;

/// Expected response format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    None,
    R1,
    R1b,
    R2,
    R3,
    R4,
    R5,
    R5b,
    R6,
}

/// Data phase direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Card to host
    Read,
    /// Host to card
    Write,
}

impl Direction {
    /// Direction implied by a command index
    pub fn for_index(index: u8) -> Self {
        match index {
            CMD_READ_SINGLE_BLOCK | CMD_READ_MULTIPLE_BLOCK => Self::Read,
            // SWITCH_FUNC, SEND_EXT_CSD, SD_STATUS, SEND_TUNING_BLOCK,
            // tuning (MMC), SEND_NUM_WR_BLOCKS, SEND_WRITE_PROT, SEND_SCR
            6 | 8 | 13 | 19 | 21 | 22 | 30 | 51 => Self::Read,
            _ => Self::Write,
        }
    }
}

/// Where the data phase reads from or writes to
#[derive(Debug)]
pub enum DataBuffer {
    /// Single-descriptor DMA to a 32-bit bus address
    Dma { phys: u32 },
    /// Programmed I/O through the data port
    Pio { ptr: NonNull<u32>, words: usize },
}

// Safety: a PIO buffer is either an exclusively borrowed 'static slice or a
// raw buffer whose owner promised (see `from_raw`) not to touch it until the
// command is handed back.
unsafe impl Send for DataBuffer {}

impl DataBuffer {
    /// Programmed I/O into an exclusively owned buffer
    pub fn from_slice(buf: &'static mut [u32]) -> Self {
        Self::Pio {
            words: buf.len(),
            ptr: NonNull::from(buf).cast(),
        }
    }

    /// Programmed I/O into a raw buffer
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `words` words and must
    /// not be accessed by anyone else until the command carrying this
    /// buffer has completed. A blocking submission that times out leaves
    /// the command queued; the buffer is released once
    /// [`Sdhc::is_pending`](super::Sdhc::is_pending) returns false.
    pub unsafe fn from_raw(ptr: NonNull<u32>, words: usize) -> Self {
        Self::Pio { ptr, words }
    }

    /// DMA into a region from the DMA allocator
    pub fn from_region(region: &DmaRegion) -> Result<Self, SdhcError> {
        let phys = u32::try_from(region.phys).map_err(|_| SdhcError::AddressRange)?;
        if phys % 4 != 0 {
            return Err(SdhcError::AddressRange);
        }
        Ok(Self::Dma { phys })
    }

    pub fn is_dma(&self) -> bool {
        matches!(self, Self::Dma { .. })
    }

    /// Contents of a PIO buffer
    pub fn pio_words(&self) -> Option<&[u32]> {
        match self {
            // SAFETY: the constructors guarantee the buffer is valid and ours
            Self::Pio { ptr, words } => {
                Some(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), *words) })
            }
            Self::Dma { .. } => None,
        }
    }
}

/// Data phase of a command
#[derive(Debug)]
pub struct DataDescriptor {
    /// Bytes per block; a multiple of 4
    pub block_size: u32,
    /// Number of blocks
    pub blocks: u32,
    pub buffer: DataBuffer,
}

impl DataDescriptor {
    pub fn new(block_size: u32, blocks: u32, buffer: DataBuffer) -> Self {
        Self {
            block_size,
            blocks,
            buffer,
        }
    }

    /// Words moved per block in programmed I/O
    pub fn block_words(&self) -> usize {
        (self.block_size / 4) as usize
    }

    /// Check the descriptor against the controller's limits
    pub fn validate(&self, max_block_len: u32) -> Result<(), SdhcError> {
        if self.block_size == 0 || self.block_size % 4 != 0 || self.block_size > max_block_len {
            return Err(SdhcError::InvalidParameter);
        }
        if self.blocks == 0 || self.blocks > MAX_BLOCK_COUNT {
            return Err(SdhcError::InvalidParameter);
        }
        if let DataBuffer::Pio { words, .. } = self.buffer {
            if words < self.block_words() * self.blocks as usize {
                return Err(SdhcError::InvalidParameter);
            }
        }
        Ok(())
    }
}

/// Why a command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Tuning error
    Tuning,
    /// Current limit exceeded on the bus
    Overcurrent,
    /// Generic transfer error without a more specific cause
    Transfer,
    /// Auto CMD12 failed
    AutoCmd12,
    /// DMA engine error
    Dma,
    /// ADMA engine error
    Adma,
    /// Data end bit error
    DataEndBit,
    /// Data CRC error
    DataCrc,
    /// Data timeout
    DataTimeout,
    /// Response index mismatch
    CommandIndex,
    /// Command end bit error
    CommandEndBit,
    /// Response CRC error
    CommandCrc,
    /// No response
    CommandTimeout,
    /// Card removed mid-command
    CardRemoved,
    /// CMD/DAT lines never became free
    ControllerBusy,
}

impl CommandError {
    /// Negative result code
    pub fn code(self) -> i32 {
        match self {
            Self::Tuning => -1,
            Self::Overcurrent => -2,
            Self::Transfer => -3,
            Self::AutoCmd12 => -4,
            Self::Dma => -5,
            Self::Adma => -6,
            Self::DataEndBit => -7,
            Self::DataCrc => -8,
            Self::DataTimeout => -9,
            Self::CommandIndex => -10,
            Self::CommandEndBit => -11,
            Self::CommandCrc => -12,
            Self::CommandTimeout => -13,
            Self::CardRemoved => -14,
            Self::ControllerBusy => -15,
        }
    }
}

/// Completion state of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Pending,
    Success,
    Failed(CommandError),
}

impl Completion {
    /// 0 while pending, 1 on success, negative on failure
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Success => 1,
            Self::Failed(err) => err.code(),
        }
    }

    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }
}

/// A single SD/MMC command
#[derive(Debug)]
pub struct Command {
    /// Command index (0..=63)
    pub index: u8,
    pub arg: u32,
    pub response_type: ResponseType,
    /// Response words as read from the response registers
    pub response: [u32; 4],
    pub data: Option<DataDescriptor>,
    completion: Completion,
    errors: IntStatus,
}

impl Command {
    pub fn new(index: u8, arg: u32, response_type: ResponseType) -> Self {
        Self {
            index: index & 0x3F,
            arg,
            response_type,
            response: [0; 4],
            data: None,
            completion: Completion::Pending,
            errors: IntStatus::empty(),
        }
    }

    /// Attach a data phase
    pub fn with_data(mut self, data: DataDescriptor) -> Self {
        self.data = Some(data);
        self
    }

    /// Make a completed command submittable again
    pub fn reset(&mut self) {
        self.response = [0; 4];
        self.completion = Completion::Pending;
        self.errors = IntStatus::empty();
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    /// Error bits observed while the command was in flight
    pub fn errors(&self) -> IntStatus {
        self.errors
    }

    pub fn direction(&self) -> Direction {
        Direction::for_index(self.index)
    }

    pub fn uses_dma(&self) -> bool {
        self.data.as_ref().is_some_and(|data| data.buffer.is_dma())
    }

    /// Data phase through the data port
    pub fn uses_pio(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.buffer.is_dma())
    }

    /// Final outcome, or `None` while pending
    pub fn result(&self) -> Option<Result<(), CommandError>> {
        match self.completion {
            Completion::Pending => None,
            Completion::Success => Some(Ok(())),
            Completion::Failed(err) => Some(Err(err)),
        }
    }

    pub(super) fn record_errors(&mut self, errors: IntStatus) {
        self.errors |= errors;
    }

    pub(super) fn succeed(&mut self) {
        if self.completion.is_pending() {
            self.completion = Completion::Success;
        }
    }

    pub(super) fn fail(&mut self, err: CommandError) {
        self.completion = Completion::Failed(err);
    }
}

/// Completion callback: the finished command, its result and the caller's token
pub type Callback = fn(Command, Result<(), CommandError>, usize);

/// Why a command was not accepted or did not complete
#[derive(Debug)]
pub enum SubmitError {
    /// The queue has no free slot
    QueueFull(Command),
    /// The command was already completed and has not been reset
    NotReset(Command),
    /// The data descriptor does not fit the controller
    InvalidData(Command),
    /// The command ran and failed
    Failed(Command),
    /// Polling gave up; the command stays queued under this ticket
    ///
    /// A raw PIO buffer it carries stays in use while
    /// [`Sdhc::is_pending`](super::Sdhc::is_pending) reports the ticket.
    Timeout(Ticket),
}

impl SubmitError {
    /// Negative result code
    pub fn code(&self) -> i32 {
        match self {
            Self::Failed(cmd) => cmd.completion().code(),
            Self::QueueFull(_) => -16,
            Self::NotReset(_) => -17,
            Self::InvalidData(_) => -18,
            Self::Timeout(_) => -19,
        }
    }

    /// Get the command back, if the error carries it
    pub fn into_command(self) -> Option<Command> {
        match self {
            Self::QueueFull(cmd)
            | Self::NotReset(cmd)
            | Self::InvalidData(cmd)
            | Self::Failed(cmd) => Some(cmd),
            Self::Timeout(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_index() {
        for index in [6, 8, 13, CMD_READ_SINGLE_BLOCK, CMD_READ_MULTIPLE_BLOCK, 19, 21, 22, 30, 51] {
            assert_eq!(Direction::for_index(index), Direction::Read, "CMD{index}");
        }
        for index in [CMD_WRITE_BLOCK, CMD_WRITE_MULTIPLE_BLOCK, 42, 56] {
            assert_eq!(Direction::for_index(index), Direction::Write, "CMD{index}");
        }
    }

    #[test]
    fn test_error_codes_are_distinct_and_negative() {
        let all = [
            CommandError::Tuning,
            CommandError::Overcurrent,
            CommandError::Transfer,
            CommandError::AutoCmd12,
            CommandError::Dma,
            CommandError::Adma,
            CommandError::DataEndBit,
            CommandError::DataCrc,
            CommandError::DataTimeout,
            CommandError::CommandIndex,
            CommandError::CommandEndBit,
            CommandError::CommandCrc,
            CommandError::CommandTimeout,
            CommandError::CardRemoved,
            CommandError::ControllerBusy,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.code() < 0);
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_completion_codes() {
        assert_eq!(Completion::Pending.code(), 0);
        assert_eq!(Completion::Success.code(), 1);
        assert_eq!(Completion::Failed(CommandError::DataCrc).code(), -8);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut cmd = Command::new(17, 0, ResponseType::R1);
        cmd.response = [1, 2, 3, 4];
        cmd.record_errors(IntStatus::DCE);
        cmd.fail(CommandError::DataCrc);
        assert_eq!(cmd.result(), Some(Err(CommandError::DataCrc)));

        cmd.reset();

        assert_eq!(cmd.completion(), Completion::Pending);
        assert_eq!(cmd.response, [0; 4]);
        assert!(cmd.errors().is_empty());
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut cmd = Command::new(0, 0, ResponseType::None);
        cmd.fail(CommandError::CommandCrc);
        cmd.succeed();
        assert_eq!(cmd.completion(), Completion::Failed(CommandError::CommandCrc));
    }

    #[test]
    fn test_descriptor_validation() {
        let buf = std::boxed::Box::leak(std::vec![0u32; 256].into_boxed_slice());
        let desc = DataDescriptor::new(512, 2, DataBuffer::from_slice(buf));
        assert_eq!(desc.validate(2048), Ok(()));
        assert_eq!(desc.validate(256), Err(SdhcError::InvalidParameter));

        let short = std::boxed::Box::leak(std::vec![0u32; 64].into_boxed_slice());
        let desc = DataDescriptor::new(512, 1, DataBuffer::from_slice(short));
        assert_eq!(desc.validate(2048), Err(SdhcError::InvalidParameter));

        let desc = DataDescriptor::new(6, 1, DataBuffer::Dma { phys: 0x1000 });
        assert_eq!(desc.validate(2048), Err(SdhcError::InvalidParameter));

        let desc = DataDescriptor::new(512, 0x1_0000, DataBuffer::Dma { phys: 0x1000 });
        assert_eq!(desc.validate(2048), Err(SdhcError::InvalidParameter));
    }

    #[test]
    fn test_dma_buffer_requires_32bit_address() {
        let low = DmaRegion {
            virt: 0x8000,
            phys: 0x8000,
            size: 512,
        };
        assert!(matches!(
            DataBuffer::from_region(&low),
            Ok(DataBuffer::Dma { phys: 0x8000 })
        ));

        let high = DmaRegion {
            virt: 0x8000,
            phys: 0x1_0000_8000,
            size: 512,
        };
        assert!(matches!(
            DataBuffer::from_region(&high),
            Err(SdhcError::AddressRange)
        ));
    }
}
