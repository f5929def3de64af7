//! Host controller interface for card protocol layers
//!
//! [`SdioHost`] is what an SD/MMC protocol stack programs against; it is
//! object safe so one stack can drive any controller variant.
//!
//! [`SharedHost`] puts a host behind an `AtomicRefCell` so both thread
//! context and the interrupt handler can reach it. The interrupt side never
//! waits: if thread context holds the host, the event is left latched in
//! the controller and serviced by the next poll or interrupt.

use atomic_refcell::{AtomicRefCell, AtomicRefMut};

use super::command::{Callback, Command, SubmitError};
use super::platform::Platform;
use super::{Sdhc, SdhcError};
use crate::mmio::RegisterIo;
use crate::services::DmaAllocator;

/// Operations a card protocol layer needs from a host controller
pub trait SdioHost {
    /// Service an interrupt raised on line `irq`
    fn handle_irq(&mut self, irq: u32);

    /// The `n`th interrupt line, or `None` past the end
    fn nth_irq(&self, n: usize) -> Option<u32>;

    /// Submit and wait for completion
    fn send_command(&mut self, cmd: Command) -> Result<Command, SubmitError>;

    /// Submit and return; `callback` runs on completion
    fn send_command_async(
        &mut self,
        cmd: Command,
        callback: Callback,
        token: usize,
    ) -> Result<(), SubmitError>;

    fn is_voltage_compatible(&self, millivolts: u32) -> bool;

    fn reset(&mut self) -> Result<(), SdhcError>;

    fn set_operational(&mut self) -> Result<(), SdhcError>;

    fn present_state(&self) -> u32;
}

impl<R: RegisterIo, P: Platform, A: DmaAllocator> SdioHost for Sdhc<R, P, A> {
    fn handle_irq(&mut self, irq: u32) {
        if !self.irqs.contains(&irq) {
            log::trace!("SDHC: irq {} is not ours", irq);
            return;
        }
        Sdhc::handle_irq(self);
    }

    fn nth_irq(&self, n: usize) -> Option<u32> {
        Sdhc::nth_irq(self, n)
    }

    fn send_command(&mut self, cmd: Command) -> Result<Command, SubmitError> {
        Sdhc::send_command(self, cmd)
    }

    fn send_command_async(
        &mut self,
        cmd: Command,
        callback: Callback,
        token: usize,
    ) -> Result<(), SubmitError> {
        Sdhc::send_command_async(self, cmd, callback, token)
    }

    fn is_voltage_compatible(&self, millivolts: u32) -> bool {
        Sdhc::is_voltage_compatible(self, millivolts)
    }

    fn reset(&mut self) -> Result<(), SdhcError> {
        Sdhc::reset(self)
    }

    fn set_operational(&mut self) -> Result<(), SdhcError> {
        Sdhc::set_operational(self)
    }

    fn present_state(&self) -> u32 {
        Sdhc::present_state(self)
    }
}

/// A host shared between thread and interrupt context
pub struct SharedHost<H> {
    inner: AtomicRefCell<H>,
}

impl<H> SharedHost<H> {
    pub const fn new(host: H) -> Self {
        Self {
            inner: AtomicRefCell::new(host),
        }
    }

    /// Exclusive access from thread context, `None` while the host is in use
    pub fn lock(&self) -> Option<AtomicRefMut<'_, H>> {
        self.inner.try_borrow_mut().ok()
    }

    pub fn into_inner(self) -> H {
        self.inner.into_inner()
    }
}

impl<H: SdioHost> SharedHost<H> {
    /// Interrupt entry point
    ///
    /// Returns `false` when the host was busy and the event was deferred.
    pub fn on_interrupt(&self, irq: u32) -> bool {
        match self.inner.try_borrow_mut() {
            Ok(mut host) => {
                host.handle_irq(irq);
                true
            }
            Err(_) => {
                log::trace!("SDHC: irq {} deferred, host in use", irq);
                false
            }
        }
    }
}

// SAFETY: the cell only ever hands out exclusive borrows, so moving `H`
// between contexts is all sharing requires
unsafe impl<H: Send> Sync for SharedHost<H> {}
