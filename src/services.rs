//! External platform services
//!
//! The controller core needs two collaborators it does not implement
//! itself: something that can switch clocks, power and resets for the SD
//! block (a firmware mailbox, a coprocessor RPC channel, a clock/reset
//! unit), and an allocator for physically addressable buffers.

/// Errors reported by a platform service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// The service did not answer
    NoResponse,
    /// The service answered with a failure status
    Rejected,
    /// The requested clock, device or reset line is unknown
    UnknownId,
}

/// Clock, power and reset control for peripherals
pub trait ClockPowerService {
    /// Current rate of the clock identified by `clock_id`, in Hz
    fn base_clock_hz(&self, clock_id: u32) -> Result<u32, ServiceError>;

    /// Switch a device on or off; returns whether it reached the requested state
    fn set_power_state(&self, device_id: u32, on: bool) -> bool;

    fn assert_reset(&self, reset_id: u32) -> Result<(), ServiceError>;

    fn deassert_reset(&self, reset_id: u32) -> Result<(), ServiceError>;
}

impl<T: ClockPowerService + ?Sized> ClockPowerService for &T {
    fn base_clock_hz(&self, clock_id: u32) -> Result<u32, ServiceError> {
        (**self).base_clock_hz(clock_id)
    }

    fn set_power_state(&self, device_id: u32, on: bool) -> bool {
        (**self).set_power_state(device_id, on)
    }

    fn assert_reset(&self, reset_id: u32) -> Result<(), ServiceError> {
        (**self).assert_reset(reset_id)
    }

    fn deassert_reset(&self, reset_id: u32) -> Result<(), ServiceError> {
        (**self).deassert_reset(reset_id)
    }
}

/// A physically contiguous buffer usable for DMA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// CPU virtual address
    pub virt: usize,
    /// Bus/physical address
    pub phys: u64,
    /// Size in bytes
    pub size: usize,
}

/// Allocator for DMA-capable memory
pub trait DmaAllocator {
    /// Allocate `size` bytes aligned to `align`
    fn alloc(&self, size: usize, align: usize) -> Option<DmaRegion>;

    /// Return a region obtained from [`DmaAllocator::alloc`]
    fn free(&self, region: DmaRegion, align: usize);

    /// Translate a virtual address to its physical address
    fn translate(&self, virt: usize) -> Option<u64>;
}

impl<T: DmaAllocator + ?Sized> DmaAllocator for &T {
    fn alloc(&self, size: usize, align: usize) -> Option<DmaRegion> {
        (**self).alloc(size, align)
    }

    fn free(&self, region: DmaRegion, align: usize) {
        (**self).free(region, align)
    }

    fn translate(&self, virt: usize) -> Option<u64> {
        (**self).translate(virt)
    }
}

/// Allocator for systems where the controller only does programmed I/O
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDma;

impl DmaAllocator for NoDma {
    fn alloc(&self, _size: usize, _align: usize) -> Option<DmaRegion> {
        None
    }

    fn free(&self, _region: DmaRegion, _align: usize) {}

    fn translate(&self, _virt: usize) -> Option<u64> {
        None
    }
}
