//! MiG-V board assembly for the OTP controller.
//!
//! Places the controller at its SoC address, attaches the configured drive,
//! applies power-on reset, and exposes guest-style helpers that drive the
//! selector/data protocol through the bus.
//!
//! | Address Range           | Device |
//! |-------------------------|--------|
//! | 0x0041_0000–0x0041_0FFF | OTP    |

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use tracing::info;

use crate::bus::AddressSpace;
use crate::config::OtpConfig;
use crate::error::{BoardError, BusError};
use crate::medium::PersistentMedium;
use crate::peripherals::otp::{ADDR_DATA, ADDR_SELECTOR};
use crate::peripherals::{Lifecycle, OtpCtrl};

/// Base address of the OTP register window.
pub const OTP_BASE: u64 = 0x0041_0000;
/// OTP register window size: 4 KiB
pub const OTP_SIZE: u64 = 0x1000;

/// Register access width used by the guest helpers.
const ACCESS_SIZE: u32 = 4;

pub struct Board {
    pub bus: AddressSpace,
    otp: Rc<RefCell<OtpCtrl>>,
}

impl Board {
    /// Build the board from configuration, opening the drive if one is set.
    pub fn build(config: &OtpConfig) -> Result<Self, BoardError> {
        Self::with_medium(config.open_medium()?)
    }

    /// Build the board around an already-opened medium.
    pub fn with_medium(medium: Option<Box<dyn PersistentMedium>>) -> Result<Self, BoardError> {
        let mut otp = OtpCtrl::new();
        otp.attach(medium)?;
        otp.reset();

        let otp = Rc::new(RefCell::new(otp));
        let mut bus = AddressSpace::new();
        bus.map("otp", OTP_BASE, OTP_SIZE, Box::new(Rc::clone(&otp)))?;

        {
            let ctrl = otp.borrow();
            let store = ctrl.store();
            info!(
                base = OTP_BASE,
                fuses = store.valid_count(),
                backed = store.is_backed(),
                read_only = store.read_only(),
                "OTP controller ready"
            );
        }
        Ok(Board { bus, otp })
    }

    pub fn otp(&self) -> Ref<'_, OtpCtrl> {
        self.otp.borrow()
    }

    pub fn otp_mut(&mut self) -> RefMut<'_, OtpCtrl> {
        self.otp.borrow_mut()
    }

    /// Power-on reset of every device on the board.
    pub fn reset(&mut self) {
        self.otp.borrow_mut().reset();
    }

    /// Select `index` and read it back through the data port.
    pub fn read_fuse(&mut self, index: u32) -> Result<u32, BusError> {
        self.bus.write(OTP_BASE + ADDR_SELECTOR, ACCESS_SIZE, index as u64)?;
        Ok(self.bus.read(OTP_BASE + ADDR_DATA, ACCESS_SIZE)? as u32)
    }

    /// Select `index` and OR `value` into it through the data port.
    pub fn program_fuse(&mut self, index: u32, value: u32) -> Result<(), BusError> {
        self.bus.write(OTP_BASE + ADDR_SELECTOR, ACCESS_SIZE, index as u64)?;
        self.bus.write(OTP_BASE + ADDR_DATA, ACCESS_SIZE, value as u64)
    }
}
