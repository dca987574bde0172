//! MiG-V SoC peripheral emulation.
//!
//! Peripherals are plain structs wired together by the board and reached
//! through the [`AddressSpace`](crate::bus::AddressSpace) router. Each one
//! implements two contracts:
//!
//! - [`MmioDevice`]: register decode for accesses inside its window
//! - [`Lifecycle`]: construction-time attach and power-on reset
//!
//! Currently provided:
//!
//! - [`OtpCtrl`]: one-time-programmable fuse controller (selector + data port)

use std::cell::RefCell;
use std::ops::RangeInclusive;
use std::rc::Rc;

use crate::error::AttachError;
use crate::medium::PersistentMedium;

pub mod otp;

pub use otp::OtpCtrl;

/// A device decoding accesses inside a memory-mapped window.
///
/// Offsets are relative to the window base. Accesses outside
/// [`access_sizes`](Self::access_sizes) are rejected by the router and never
/// reach the device.
pub trait MmioDevice {
    /// Access widths in bytes the device accepts.
    fn access_sizes(&self) -> RangeInclusive<u32> {
        1..=8
    }

    fn read(&mut self, offset: u64, size: u32) -> u64;

    fn write(&mut self, offset: u64, size: u32, value: u64);
}

/// Construction and reset hooks.
pub trait Lifecycle {
    /// Bind the device to its optional backing medium. Called once; an error
    /// means the device must not be used.
    fn attach(&mut self, medium: Option<Box<dyn PersistentMedium>>) -> Result<(), AttachError>;

    /// Return the device to its power-on state.
    fn reset(&mut self);
}

// Lets the board keep a handle to a device it has also mapped into a bus.
impl<T: MmioDevice> MmioDevice for Rc<RefCell<T>> {
    fn access_sizes(&self) -> RangeInclusive<u32> {
        self.borrow().access_sizes()
    }

    fn read(&mut self, offset: u64, size: u32) -> u64 {
        self.borrow_mut().read(offset, size)
    }

    fn write(&mut self, offset: u64, size: u32, value: u64) {
        self.borrow_mut().write(offset, size, value)
    }
}
