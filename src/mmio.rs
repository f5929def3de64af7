//! Memory-mapped register access
//!
//! Controller code never touches raw pointers directly; it goes through
//! [`RegisterIo`], which is implemented by [`MmioRegion`] for real hardware
//! and by a register-file model in the unit tests.

use core::ptr;

/// 32-bit register access relative to a device base address
pub trait RegisterIo {
    /// Read the register at `offset` bytes from the base
    fn read32(&self, offset: usize) -> u32;

    /// Write the register at `offset` bytes from the base
    fn write32(&self, offset: usize, value: u32);

    /// Read-modify-write: clear `clear`, then set `set`
    fn modify32(&self, offset: usize, clear: u32, set: u32) {
        let value = self.read32(offset);
        self.write32(offset, (value & !clear) | set);
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

/// A mapped MMIO window
#[derive(Debug)]
pub struct MmioRegion {
    base: usize,
    size: usize,
}

// Safety: the region only holds an address; every access is a single
// volatile load or store, and the owning driver serialises them.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Wrap a mapped register window
    ///
    /// # Safety
    ///
    /// `base..base + size` must be mapped device memory that stays valid
    /// for the lifetime of the region, and `base` must be 4-byte aligned.
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Base virtual address of the window
    pub fn base(&self) -> usize {
        self.base
    }

    /// Size of the window in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

impl RegisterIo for MmioRegion {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size);
        // SAFETY: `new` guarantees the window is mapped and aligned
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size);
        // SAFETY: `new` guarantees the window is mapped and aligned
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmio_region_volatile_access() {
        let mut backing = [0u32; 4];
        let base = backing.as_mut_ptr() as usize;
        let region = unsafe { MmioRegion::new(base, 16) };

        region.write32(4, 0xdead_beef);
        region.modify32(4, 0xffff, 0x1234);

        assert_eq!(region.read32(4), 0xdead_1234);
        assert_eq!(region.read32(0), 0);
        assert_eq!(region.size(), 16);
    }

    #[test]
    fn test_reference_forwards() {
        let mut backing = [0u32; 2];
        let region = unsafe { MmioRegion::new(backing.as_mut_ptr() as usize, 8) };
        let by_ref: &MmioRegion = &region;

        by_ref.write32(0, 7);
        assert_eq!((&by_ref).read32(0), 7);
    }
}
