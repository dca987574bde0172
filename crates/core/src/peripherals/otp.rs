//! OTP fuse controller register interface.
//!
//! The fuse array is too wide to map directly, so software selects a fuse
//! through one register and accesses it through another:
//!
//! | Offset | Register | Read                  | Write                      |
//! |--------|----------|-----------------------|----------------------------|
//! | 0x00   | SELECTOR | current fuse index    | set fuse index (low 32 bits) |
//! | 0x04   | DATA     | selected fuse value   | OR bits into selected fuse |
//!
//! Everything else in the 4 KiB window is undecoded. Undecoded offsets and
//! out-of-range fuse accesses are guest errors: they are logged, reads return
//! 0, and nothing is modified.

use std::ops::RangeInclusive;

use tracing::{error, trace, warn};

use super::{Lifecycle, MmioDevice};
use crate::error::{AccessError, AttachError, SnapshotError};
use crate::fuse_store::FuseStore;
use crate::medium::PersistentMedium;
use crate::savestate::OtpState;
use crate::GUEST_ERROR;

/// Fuse index register.
pub const ADDR_SELECTOR: u64 = 0x00;
/// Fuse data port.
pub const ADDR_DATA: u64 = 0x04;

/// OTP controller: register decode in front of a [`FuseStore`].
pub struct OtpCtrl {
    store: FuseStore,
}

impl OtpCtrl {
    pub fn new() -> Self {
        OtpCtrl { store: FuseStore::new() }
    }

    pub fn store(&self) -> &FuseStore {
        &self.store
    }

    /// Decode a register read, reporting faults instead of absorbing them.
    pub fn try_read(&self, offset: u64) -> Result<u64, AccessError> {
        match offset {
            ADDR_SELECTOR => Ok(self.store.selector() as u64),
            ADDR_DATA => self.store.read_selected().map(u64::from),
            _ => Err(AccessError::InvalidRegister { dir: "read", offset }),
        }
    }

    /// Decode a register write, reporting faults instead of absorbing them.
    pub fn try_write(&mut self, offset: u64, value: u64) -> Result<(), AccessError> {
        match offset {
            ADDR_SELECTOR => {
                self.store.select(value as u32);
                Ok(())
            }
            ADDR_DATA => self.store.write_selected(value),
            _ => Err(AccessError::InvalidRegister { dir: "write", offset }),
        }
    }

    pub fn save_state(&self) -> OtpState {
        self.store.save_state()
    }

    pub fn load_state(&mut self, s: OtpState) -> Result<(), SnapshotError> {
        self.store.load_state(s)
    }
}

impl Default for OtpCtrl {
    fn default() -> Self {
        Self::new()
    }
}

/// Send a runtime fault to the diagnostic channel.
fn report(err: &AccessError) {
    match err {
        AccessError::WriteThrough { .. } => error!("mig_v_otp: {}", err),
        _ => warn!(target: GUEST_ERROR, "mig_v_otp: {}", err),
    }
}

impl MmioDevice for OtpCtrl {
    fn access_sizes(&self) -> RangeInclusive<u32> {
        4..=8
    }

    fn read(&mut self, offset: u64, size: u32) -> u64 {
        let result = self.try_read(offset);
        trace!(offset, size, ?result, "otp read");
        result.unwrap_or_else(|e| {
            report(&e);
            0
        })
    }

    fn write(&mut self, offset: u64, size: u32, value: u64) {
        trace!(offset, size, value, "otp write");
        if let Err(e) = self.try_write(offset, value) {
            report(&e);
        }
    }
}

impl Lifecycle for OtpCtrl {
    fn attach(&mut self, medium: Option<Box<dyn PersistentMedium>>) -> Result<(), AttachError> {
        self.store.attach(medium)
    }

    fn reset(&mut self) {
        self.store.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemMedium;
    use crate::FUSE_COUNT;

    fn ctrl() -> OtpCtrl {
        let mut otp = OtpCtrl::new();
        otp.attach(None).unwrap();
        otp.reset();
        otp
    }

    #[test]
    fn test_selector_readback() {
        let mut otp = ctrl();
        otp.write(ADDR_SELECTOR, 4, 0x1_0000_0042);
        assert_eq!(otp.read(ADDR_SELECTOR, 4), 0x42);
        // Not bounds-checked on write
        otp.write(ADDR_SELECTOR, 8, 0xFFFF_FFFF);
        assert_eq!(otp.read(ADDR_SELECTOR, 8), 0xFFFF_FFFF);
    }

    #[test]
    fn test_data_or_accumulates() {
        let mut otp = ctrl();
        otp.write(ADDR_SELECTOR, 4, 5);
        otp.write(ADDR_DATA, 4, 0x0F);
        otp.write(ADDR_DATA, 4, 0xF0);
        assert_eq!(otp.read(ADDR_DATA, 4), 0xFF);
        otp.write(ADDR_DATA, 4, 0);
        assert_eq!(otp.read(ADDR_DATA, 8), 0xFF);
    }

    #[test]
    fn test_out_of_bounds_data_access() {
        let mut otp = ctrl();
        otp.write(ADDR_SELECTOR, 4, 2000);
        otp.write(ADDR_DATA, 4, 0xFF);
        assert_eq!(otp.read(ADDR_DATA, 4), 0);
        assert!(matches!(
            otp.try_write(ADDR_DATA, 0xFF),
            Err(AccessError::WriteOutOfBounds { selector: 2000, value: 0xFF })
        ));
        assert!(otp.store().fuses().iter().all(|&f| f == 0));
    }

    #[test]
    fn test_invalid_register() {
        let mut otp = ctrl();
        for offset in [0x02, 0x08, 0x0C, 0xFFC] {
            assert!(matches!(
                otp.try_read(offset),
                Err(AccessError::InvalidRegister { dir: "read", .. })
            ));
            assert_eq!(otp.read(offset, 4), 0);
            otp.write(offset, 4, 0xFFFF_FFFF);
        }
        assert_eq!(otp.read(ADDR_SELECTOR, 4), 0);
        assert!(otp.store().fuses().iter().all(|&f| f == 0));
    }

    #[test]
    fn test_unpopulated_before_reset() {
        let mut otp = OtpCtrl::new();
        otp.attach(None).unwrap();
        assert!(matches!(otp.try_read(ADDR_DATA), Err(AccessError::ReadOutOfBounds { selector: 0 })));
        otp.reset();
        assert_eq!(otp.try_read(ADDR_DATA).unwrap(), 0);
        assert_eq!(otp.store().valid_count() as usize, FUSE_COUNT);
    }

    #[test]
    fn test_backed_write_through() {
        let handle = MemMedium::new(vec![0; 8]);
        let mut otp = OtpCtrl::new();
        otp.attach(Some(Box::new(handle.clone()))).unwrap();
        otp.reset();
        otp.write(ADDR_SELECTOR, 4, 1);
        otp.write(ADDR_DATA, 4, 0x8000_0001);
        assert_eq!(handle.contents(), vec![0, 0, 0, 0, 0x01, 0, 0, 0x80]);
        // Past the drive size
        otp.write(ADDR_SELECTOR, 4, 2);
        otp.write(ADDR_DATA, 4, 1);
        assert_eq!(handle.contents().len(), 8);
    }

    #[test]
    fn test_access_sizes() {
        assert_eq!(ctrl().access_sizes(), 4..=8);
    }
}
