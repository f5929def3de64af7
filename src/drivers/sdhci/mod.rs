//! SD Host Controller driver core
//!
//! This module drives 32-bit SD host controllers (i.MX uSDHC, Broadcom
//! Arasan EMMC) through an interrupt-driven command engine. Commands are
//! queued FIFO; the head of the queue is the only command on the wire, and
//! every interrupt (or poll, for blocking callers) runs the completion state
//! machine in [`irq`] against it. Data moves either by single-descriptor
//! DMA or by programmed I/O through the data port, one block per
//! buffer-ready event.
//!
//! Card protocol (CMD0/CMD8/ACMD41 sequencing and so on) lives above this
//! layer: the engine transports opaque commands.

pub mod clock;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod host;
pub mod irq;
pub mod platform;
pub mod queue;
pub mod regs;

#[cfg(test)]
pub(crate) mod mock;

use heapless::Vec;

use crate::mmio::RegisterIo;
use crate::services::{DmaAllocator, DmaRegion, NoDma};
use crate::time::wait_for;

use clock::{ClockMode, SpecVersion};
use command::{Callback, Command, CommandError, SubmitError};
use config::SdhcConfig;
use platform::{ClockRequest, Platform};
use queue::{CommandQueue, InFlight, Ticket};
use regs::*;

pub use command::{Completion, DataBuffer, DataDescriptor, Direction, ResponseType};
pub use host::{SdioHost, SharedHost};

/// Commands that can be queued at once (including the one in flight)
pub const QUEUE_DEPTH: usize = 8;

/// Interrupt lines a controller can be wired to
pub const MAX_IRQS: usize = 4;

/// Alignment of buffers from [`Sdhc::alloc_dma`]
pub const DMA_ALIGN: usize = 4096;

/// Controller-level error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdhcError {
    /// Invalid parameter
    InvalidParameter,
    /// More interrupt lines than the controller can track
    TooManyIrqs,
    /// Commands are still queued
    Busy,
    /// Software reset or init sequence did not finish
    ResetTimeout,
    /// Internal or SD clock did not stabilise
    ClockUnstable,
    /// CMD/DAT lines stayed busy
    LineBusy,
    /// Base clock could not be read from the clock service
    ClockService,
    /// The SD block did not power on
    PowerFailed,
    /// Reset line control failed
    ResetControl,
    /// DMA memory allocation failed
    AllocationFailed,
    /// Buffer is outside the 32-bit DMA range
    AddressRange,
}

impl SdhcError {
    /// Negative error code
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidParameter => -1,
            Self::TooManyIrqs => -2,
            Self::Busy => -3,
            Self::ResetTimeout => -4,
            Self::ClockUnstable => -5,
            Self::LineBusy => -6,
            Self::ClockService => -7,
            Self::PowerFailed => -8,
            Self::ResetControl => -9,
            Self::AllocationFailed => -10,
            Self::AddressRange => -11,
        }
    }
}

/// SD host controller instance
pub struct Sdhc<R, P, A = NoDma> {
    regs: SdhcRegs<R>,
    platform: P,
    dma: A,
    /// Specification version read at init
    version: SpecVersion,
    irqs: Vec<u32, MAX_IRQS>,
    queue: CommandQueue<QUEUE_DEPTH>,
    /// Buffer-ready events still expected by the head command
    blocks_remaining: u32,
    config: SdhcConfig,
    /// Blocking submission currently being polled for
    waiting: Option<Ticket>,
    /// Finished command parked for its blocking submitter
    finished: Option<(Ticket, Command)>,
}

impl<R: RegisterIo, P: Platform, A: DmaAllocator> Sdhc<R, P, A> {
    /// Take over a controller
    ///
    /// Reads the specification version, masks every interrupt source and
    /// acknowledges whatever status is latched. The controller is not
    /// reset; call [`Sdhc::reset`] before issuing commands.
    pub fn new(
        io: R,
        irq_table: &[u32],
        platform: P,
        dma: A,
        config: SdhcConfig,
    ) -> Result<Self, SdhcError> {
        let irqs = Vec::from_slice(irq_table).map_err(|()| {
            log::error!("SDHC: {} interrupts given, at most {}", irq_table.len(), MAX_IRQS);
            SdhcError::TooManyIrqs
        })?;

        let regs = SdhcRegs::new(io);
        let version = SpecVersion::from_raw(regs.raw_version());

        regs.set_int_status_enable(IntStatus::empty());
        regs.set_int_signal_enable(IntStatus::empty());
        regs.ack_int_status(regs.int_status());

        log::info!(
            "SDHC: {} controller, spec v{}, {} irq(s)",
            platform.name(),
            version.number(),
            irqs.len()
        );

        Ok(Self {
            regs,
            platform,
            dma,
            version,
            irqs,
            queue: CommandQueue::new(),
            blocks_remaining: 0,
            config,
            waiting: None,
            finished: None,
        })
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    pub fn config(&self) -> &SdhcConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn regs(&self) -> &SdhcRegs<R> {
        &self.regs
    }

    /// The `n`th interrupt line of this controller
    pub fn nth_irq(&self, n: usize) -> Option<u32> {
        self.irqs.get(n).copied()
    }

    pub fn irq_count(&self) -> usize {
        self.irqs.len()
    }

    /// No command queued or in flight
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Commands queued, including the one in flight
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Raw present state register
    pub fn present_state(&self) -> u32 {
        self.regs.read(PRES_STATE)
    }

    /// Whether the host can drive the card at `millivolts`
    pub fn is_voltage_compatible(&self, millivolts: u32) -> bool {
        let caps = self.regs.capabilities();
        match millivolts {
            3300 => caps.is_set(HOST_CTRL_CAP::VS33),
            3000 => caps.is_set(HOST_CTRL_CAP::VS30),
            1800 => caps.is_set(HOST_CTRL_CAP::VS18),
            _ => false,
        }
    }

    pub fn supports_dma(&self) -> bool {
        self.regs.capabilities().is_set(HOST_CTRL_CAP::DMAS)
    }

    pub fn supports_adma(&self) -> bool {
        self.regs.capabilities().is_set(HOST_CTRL_CAP::ADMAS)
    }

    pub fn supports_high_speed(&self) -> bool {
        self.regs.capabilities().is_set(HOST_CTRL_CAP::HSS)
    }

    /// Largest block the controller buffer accepts, in bytes
    pub fn max_block_len(&self) -> u32 {
        512 << self.regs.capabilities().read(HOST_CTRL_CAP::MBL)
    }

    pub fn card_present(&self) -> bool {
        self.regs.present_state().is_set(PRES_STATE::CINST)
    }

    pub fn write_protected(&self) -> bool {
        self.regs.present_state().is_set(PRES_STATE::WPSPL)
    }

    /// OCR voltage window to offer a card that reported `card_ocr`
    pub fn card_voltage_window(&self, card_ocr: u32) -> u32 {
        self.platform
            .card_voltage_window(self.is_voltage_compatible(3300), card_ocr)
    }

    // ========================================================================
    // Reset and Clocking
    // ========================================================================

    /// Full software reset and bring-up to identification mode
    pub fn reset(&mut self) -> Result<(), SdhcError> {
        if !self.queue.is_empty() {
            log::error!("SDHC: reset refused, {} command(s) queued", self.queue.len());
            return Err(SdhcError::Busy);
        }

        self.regs.modify(SYS_CTRL, SYS_CTRL::RSTA::SET);
        if !wait_for(self.config.spin_limit, || {
            !self.regs.sys_ctrl().is_set(SYS_CTRL::RSTA)
        }) {
            log::error!("SDHC: software reset timed out");
            return Err(SdhcError::ResetTimeout);
        }

        let mask = IntStatus::AMBIENT | IntStatus::BUFFER_READY | IntStatus::COMPLETION;
        self.regs.set_int_status_enable(mask);
        self.regs.set_int_signal_enable(mask);

        self.set_clock(ClockMode::Initial)?;

        self.regs.modify(PROT_CTRL, PROT_CTRL::DTW::FourBit);

        if !wait_for(self.config.spin_limit, || !self.regs.lines_busy()) {
            log::error!("SDHC: CMD/DAT lines busy after reset");
            return Err(SdhcError::LineBusy);
        }

        // 80 clocks to wake the card
        self.regs.modify(SYS_CTRL, SYS_CTRL::INITA::SET);
        if !wait_for(self.config.spin_limit, || {
            !self.regs.sys_ctrl().is_set(SYS_CTRL::INITA)
        }) {
            log::error!("SDHC: card init sequence timed out");
            return Err(SdhcError::ResetTimeout);
        }

        self.blocks_remaining = 0;

        if self.card_present() {
            log::info!(
                "SDHC: card inserted{}",
                if self.write_protected() { " (read-only)" } else { "" }
            );
        } else {
            log::info!("SDHC: no card inserted");
        }

        Ok(())
    }

    /// Switch to the data transfer clock
    pub fn set_operational(&mut self) -> Result<(), SdhcError> {
        if !self.queue.is_empty() {
            log::error!("SDHC: clock change refused, {} command(s) queued", self.queue.len());
            return Err(SdhcError::Busy);
        }
        self.set_clock(ClockMode::Operational)
    }

    fn set_clock(&self, mode: ClockMode) -> Result<(), SdhcError> {
        let request = ClockRequest {
            mode,
            target_hz: self.config.clock_hz(mode),
            version: self.version,
            spin_limit: self.config.spin_limit,
        };
        self.platform.set_clock(&self.regs, request)
    }

    // ========================================================================
    // Command Submission
    // ========================================================================

    /// Queue a command, dispatching it at once if the controller is idle
    fn enqueue(
        &mut self,
        cmd: Command,
        callback: Option<Callback>,
        token: usize,
    ) -> Result<Ticket, SubmitError> {
        if !cmd.completion().is_pending() {
            log::error!("SDHC: CMD{} resubmitted without reset", cmd.index);
            return Err(SubmitError::NotReset(cmd));
        }

        let max_block_len = self.max_block_len();
        let valid = cmd
            .data
            .as_ref()
            .map_or(Ok(()), |data| data.validate(max_block_len));
        if valid.is_err() {
            log::error!("SDHC: CMD{} has an invalid data descriptor", cmd.index);
            return Err(SubmitError::InvalidData(cmd));
        }

        let (ticket, was_idle) = self
            .queue
            .push(cmd, callback, token)
            .map_err(SubmitError::QueueFull)?;
        if callback.is_none() {
            self.waiting = Some(ticket);
        }
        if was_idle {
            self.dispatch_next();
        }
        Ok(ticket)
    }

    /// Submit and poll until the command completes
    ///
    /// Returns the command with its response on success; a failed command
    /// is returned inside [`SubmitError::Failed`]. Polling is unbounded
    /// unless [`SdhcConfig::poll_limit`] is set, in which case the command
    /// is abandoned (left queued) after that many polls.
    pub fn send_command(&mut self, cmd: Command) -> Result<Command, SubmitError> {
        let ticket = self.enqueue(cmd, None, 0)?;
        let cmd = self.poll_until_finished(ticket)?;
        match cmd.result() {
            Some(Ok(())) => Ok(cmd),
            _ => Err(SubmitError::Failed(cmd)),
        }
    }

    /// Submit and return at once; `callback` runs from [`Sdhc::handle_irq`]
    pub fn send_command_async(
        &mut self,
        cmd: Command,
        callback: Callback,
        token: usize,
    ) -> Result<(), SubmitError> {
        self.enqueue(cmd, Some(callback), token).map(|_| ())
    }

    /// Blocking without a callback, asynchronous with one
    pub fn submit(
        &mut self,
        cmd: Command,
        callback: Option<Callback>,
        token: usize,
    ) -> Result<Option<Command>, SubmitError> {
        match callback {
            Some(callback) => self.send_command_async(cmd, callback, token).map(|()| None),
            None => self.send_command(cmd).map(Some),
        }
    }

    /// Whether the command behind `ticket` is still queued or in flight
    pub fn is_pending(&self, ticket: Ticket) -> bool {
        self.queue.contains(ticket)
    }

    fn poll_until_finished(&mut self, ticket: Ticket) -> Result<Command, SubmitError> {
        let mut polls: u32 = 0;
        loop {
            if self.finished.as_ref().is_some_and(|(done, _)| *done == ticket) {
                if let Some((_, cmd)) = self.finished.take() {
                    return Ok(cmd);
                }
            }

            if self.config.poll_limit.is_some_and(|limit| polls >= limit) {
                log::warn!("SDHC: gave up waiting after {} polls", polls);
                self.waiting = None;
                return Err(SubmitError::Timeout(ticket));
            }

            self.handle_irq();
            polls = polls.saturating_add(1);
        }
    }

    // ========================================================================
    // Dispatch and Delivery
    // ========================================================================

    /// Issue the head command if it is not on the wire yet
    ///
    /// A command that cannot be issued is failed, unlinked and returned.
    fn issue_head(&mut self) -> Option<InFlight> {
        let head = self.queue.head_mut()?;
        if head.issued {
            return None;
        }
        head.command_done = false;
        head.data_done = false;
        head.pio_offset = 0;

        match dispatch::issue(
            &self.regs,
            &self.platform,
            self.version,
            self.config.spin_limit,
            &head.cmd,
        ) {
            Ok(blocks) => {
                head.issued = true;
                self.blocks_remaining = blocks;
                None
            }
            Err(err) => {
                head.cmd.fail(err);
                self.queue.pop()
            }
        }
    }

    /// Issue queued commands until one is on the wire or the queue is empty
    fn dispatch_next(&mut self) {
        while let Some(failed) = self.issue_head() {
            self.deliver(failed);
        }
    }

    /// Hand a finished command back to its submitter
    fn deliver(&mut self, entry: InFlight) {
        let result = match entry.cmd.completion() {
            Completion::Success => Ok(()),
            Completion::Failed(err) => Err(err),
            Completion::Pending => Err(CommandError::Transfer),
        };

        match entry.callback {
            Some(callback) => callback(entry.cmd, result, entry.token),
            None if self.waiting == Some(entry.ticket) => {
                self.waiting = None;
                self.finished = Some((entry.ticket, entry.cmd));
            }
            None => log::warn!(
                "SDHC: CMD{} finished after its submitter gave up ({:?})",
                entry.cmd.index,
                result
            ),
        }
    }

    // ========================================================================
    // DMA Buffers
    // ========================================================================

    /// Allocate a buffer the controller can reach with SDMA
    pub fn alloc_dma(&self, size: usize) -> Result<DmaRegion, SdhcError> {
        let region = self.dma.alloc(size, DMA_ALIGN).ok_or_else(|| {
            log::error!("SDHC: DMA allocation of {} bytes failed", size);
            SdhcError::AllocationFailed
        })?;
        if u32::try_from(region.phys).is_err() {
            log::error!("SDHC: DMA buffer at {:#x} is above 4 GiB", region.phys);
            self.dma.free(region, DMA_ALIGN);
            return Err(SdhcError::AddressRange);
        }
        Ok(region)
    }

    pub fn free_dma(&self, region: DmaRegion) {
        self.dma.free(region, DMA_ALIGN);
    }

    /// Log every register at debug level
    pub fn dump_registers(&self) {
        for (name, offset) in DUMP_REGISTERS {
            log::debug!("SDHC: {:<20} [{:#04x}] = {:#010x}", name, offset, self.regs.read(offset));
        }
    }
}
