//! Memory-mapped address space.
//!
//! Routes physical accesses to the device whose window contains the address,
//! translating to a window-relative offset. Windows never overlap and are
//! kept sorted by base so lookup is a binary search.
//!
//! The router owns the access-width contract: an access whose size is outside
//! the target device's [`access_sizes`](MmioDevice::access_sizes) is rejected
//! here and never reaches the device.

use tracing::warn;

use crate::error::BusError;
use crate::peripherals::MmioDevice;
use crate::GUEST_ERROR;

struct Mapping {
    name: &'static str,
    base: u64,
    size: u64,
    dev: Box<dyn MmioDevice>,
}

impl Mapping {
    fn end_exclusive(&self) -> u128 {
        self.base as u128 + self.size as u128
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && (addr as u128) < self.end_exclusive()
    }
}

#[derive(Default)]
pub struct AddressSpace {
    mappings: Vec<Mapping>,
}

impl AddressSpace {
    pub fn new() -> Self {
        AddressSpace { mappings: Vec::new() }
    }

    /// Map `dev` over `[base, base + size)`.
    pub fn map(
        &mut self,
        name: &'static str,
        base: u64,
        size: u64,
        dev: Box<dyn MmioDevice>,
    ) -> Result<(), BusError> {
        let end = base as u128 + size as u128;
        let idx = self.mappings.partition_point(|m| m.base < base);

        let overlaps_prev = idx
            .checked_sub(1)
            .and_then(|i| self.mappings.get(i))
            .is_some_and(|prev| (base as u128) < prev.end_exclusive());
        let overlaps_next = self.mappings.get(idx).is_some_and(|next| end > next.base as u128);
        if size == 0 || overlaps_prev || overlaps_next {
            return Err(BusError::Overlap { base, size });
        }

        self.mappings.insert(idx, Mapping { name, base, size, dev });
        Ok(())
    }

    fn find(&mut self, addr: u64, size: u32) -> Result<(&mut Mapping, u64), BusError> {
        let idx = self.mappings.partition_point(|m| m.base <= addr);
        let mapping = idx
            .checked_sub(1)
            .and_then(|i| self.mappings.get_mut(i))
            .filter(|m| m.contains(addr))
            .ok_or(BusError::Unmapped { addr })?;
        if size == 0 || size > 8 || !mapping.dev.access_sizes().contains(&size) {
            return Err(BusError::InvalidAccessSize { addr, size });
        }
        let offset = addr - mapping.base;
        Ok((mapping, offset))
    }

    pub fn read(&mut self, addr: u64, size: u32) -> Result<u64, BusError> {
        match self.find(addr, size) {
            Ok((m, offset)) => Ok(m.dev.read(offset, size)),
            Err(e) => {
                warn!(target: GUEST_ERROR, "bus read: {}", e);
                Err(e)
            }
        }
    }

    pub fn write(&mut self, addr: u64, size: u32, value: u64) -> Result<(), BusError> {
        match self.find(addr, size) {
            Ok((m, offset)) => {
                m.dev.write(offset, size, value);
                Ok(())
            }
            Err(e) => {
                warn!(target: GUEST_ERROR, "bus write: {}", e);
                Err(e)
            }
        }
    }

    /// Name and window of every mapping, in address order.
    pub fn regions(&self) -> impl Iterator<Item = (&'static str, u64, u64)> + '_ {
        self.mappings.iter().map(|m| (m.name, m.base, m.size))
    }
}
