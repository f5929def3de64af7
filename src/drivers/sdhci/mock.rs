//! Register-file model of the host controller for unit tests

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use super::regs::*;
use crate::mmio::RegisterIo;
use crate::services::{ClockPowerService, DmaAllocator, DmaRegion, ServiceError};

const WORDS: usize = REG_WINDOW_SIZE / 4;

/// Behaves like the controller for the bits the driver relies on:
/// write-one-to-clear interrupt status, self-clearing resets and init
/// sequence, internal clock that stabilises as soon as it is enabled,
/// a data port backed by FIFOs, and scripted interrupt events that are
/// latched whenever the status register is read while idle.
pub struct MockRegs {
    regs: RefCell<[u32; WORDS]>,
    events: RefCell<VecDeque<IntStatus>>,
    rx_fifo: RefCell<VecDeque<u32>>,
    tx_fifo: RefCell<Vec<u32>>,
    writes: RefCell<Vec<(usize, u32)>>,
    stuck_reset: Cell<bool>,
    lines_stuck: Cell<bool>,
}

impl MockRegs {
    pub fn new() -> Self {
        let mock = Self {
            regs: RefCell::new([0; WORDS]),
            events: RefCell::new(VecDeque::new()),
            rx_fifo: RefCell::new(VecDeque::new()),
            tx_fifo: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            stuck_reset: Cell::new(false),
            lines_stuck: Cell::new(false),
        };
        // v3 controller, 3.3V + 1.8V, SDMA, 2048-byte max block, card present
        mock.set(HOST_VERSION, 0x0002_0000);
        mock.set(HOST_CTRL_CAP, (1 << 26) | (1 << 24) | (1 << 22) | (2 << 16));
        mock.set(PRES_STATE, (1 << 16) | (1 << 3));
        mock
    }

    /// Store a value without side effects
    pub fn set(&self, offset: usize, value: u32) {
        self.regs.borrow_mut()[offset / 4] = value;
    }

    /// Read a value without side effects
    pub fn get(&self, offset: usize) -> u32 {
        self.regs.borrow()[offset / 4]
    }

    /// Queue an interrupt event
    pub fn push_event(&self, status: IntStatus) {
        self.events.borrow_mut().push_back(status);
    }

    pub fn pending_events(&self) -> usize {
        self.events.borrow().len()
    }

    /// Words the card will return through the data port
    pub fn push_rx(&self, words: &[u32]) {
        self.rx_fifo.borrow_mut().extend(words.iter().copied());
    }

    /// Words written to the data port
    pub fn tx(&self) -> Vec<u32> {
        self.tx_fifo.borrow().clone()
    }

    /// Every register write, in order
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.writes.borrow().clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(off, _)| *off == offset)
            .map(|(_, value)| *value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Keep the software reset bit asserted forever
    pub fn set_stuck_reset(&self, stuck: bool) {
        self.stuck_reset.set(stuck);
    }

    /// Report the command inhibit bit permanently
    pub fn set_lines_stuck(&self, stuck: bool) {
        self.lines_stuck.set(stuck);
    }
}

impl RegisterIo for MockRegs {
    fn read32(&self, offset: usize) -> u32 {
        match offset {
            INT_STATUS => {
                if self.get(INT_STATUS) == 0 {
                    if let Some(event) = self.events.borrow_mut().pop_front() {
                        self.set(INT_STATUS, event.bits());
                    }
                }
                self.get(INT_STATUS)
            }
            PRES_STATE if self.lines_stuck.get() => self.get(PRES_STATE) | 1,
            DATA_BUFF_ACC_PORT => self.rx_fifo.borrow_mut().pop_front().unwrap_or(0),
            _ => self.get(offset),
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        self.writes.borrow_mut().push((offset, value));
        match offset {
            INT_STATUS => {
                let current = self.get(INT_STATUS);
                self.set(INT_STATUS, current & !value);
            }
            SYS_CTRL => {
                let mut stored = value & !((1 << 25) | (1 << 26) | (1 << 27));
                if !self.stuck_reset.get() {
                    stored &= !(1 << 24);
                }
                if stored & 1 != 0 {
                    stored |= 1 << 1;
                } else {
                    stored &= !(1 << 1);
                }
                self.set(SYS_CTRL, stored);
            }
            DATA_BUFF_ACC_PORT => self.tx_fifo.borrow_mut().push(value),
            _ => self.set(offset, value),
        }
    }
}

/// Clock/power service double
pub struct MockClockPower {
    pub base_clock: Result<u32, ServiceError>,
    pub power_ok: bool,
    pub reset_result: Result<(), ServiceError>,
    pub calls: RefCell<Vec<&'static str>>,
    pub clock_ids: RefCell<Vec<u32>>,
}

impl MockClockPower {
    pub fn new(base_clock: u32) -> Self {
        Self {
            base_clock: Ok(base_clock),
            power_ok: true,
            reset_result: Ok(()),
            calls: RefCell::new(Vec::new()),
            clock_ids: RefCell::new(Vec::new()),
        }
    }
}

impl ClockPowerService for MockClockPower {
    fn base_clock_hz(&self, clock_id: u32) -> Result<u32, ServiceError> {
        self.clock_ids.borrow_mut().push(clock_id);
        self.base_clock
    }

    fn set_power_state(&self, _device_id: u32, on: bool) -> bool {
        self.calls.borrow_mut().push(if on { "power_on" } else { "power_off" });
        self.power_ok
    }

    fn assert_reset(&self, _reset_id: u32) -> Result<(), ServiceError> {
        self.calls.borrow_mut().push("assert_reset");
        self.reset_result
    }

    fn deassert_reset(&self, _reset_id: u32) -> Result<(), ServiceError> {
        self.calls.borrow_mut().push("deassert_reset");
        self.reset_result
    }
}

/// Identity-mapped DMA allocator handing out fixed addresses
pub struct MockDma {
    pub next_phys: Cell<u64>,
    pub freed: RefCell<Vec<DmaRegion>>,
}

impl MockDma {
    pub fn new(first_phys: u64) -> Self {
        Self {
            next_phys: Cell::new(first_phys),
            freed: RefCell::new(Vec::new()),
        }
    }
}

impl DmaAllocator for MockDma {
    fn alloc(&self, size: usize, align: usize) -> Option<DmaRegion> {
        let phys = self.next_phys.get().next_multiple_of(align as u64);
        self.next_phys.set(phys + size as u64);
        Some(DmaRegion {
            virt: phys as usize,
            phys,
            size,
        })
    }

    fn free(&self, region: DmaRegion, _align: usize) {
        self.freed.borrow_mut().push(region);
    }

    fn translate(&self, virt: usize) -> Option<u64> {
        Some(virt as u64)
    }
}
