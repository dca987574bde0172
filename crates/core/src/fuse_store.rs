//! Fuse array storage behind the OTP controller.
//!
//! The store owns a fixed array of [`FUSE_COUNT`] 32-bit fuse words, of which
//! the first `valid_count` are addressable. Writes OR into the selected word,
//! so a bit that has been set stays set. When a writable medium is attached,
//! every successful in-bounds write is persisted at `selector * 4`.
//!
//! ## Lifecycle
//!
//! ```text
//! Unattached ──attach(None)──▶ Volatile   (valid_count = 0 until reset)
//!     │       ──attach(Some)─▶ Backed     (valid_count = ceil(len / 4))
//!     └────── attach failed ─▶ Faulted    (every access out of bounds)
//! ```
//!
//! Reset zero-fills the array and makes all fuses addressable only when no
//! medium is attached; a backed store keeps the contents loaded at attach.

use tracing::debug;

use crate::error::{AccessError, AttachError, SnapshotError};
use crate::medium::PersistentMedium;
use crate::savestate::OtpState;
use crate::FUSE_COUNT;

/// Attach progress of a [`FuseStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Unattached,
    /// No medium; contents live only in memory.
    Volatile,
    /// Contents loaded from and written through to a medium.
    Backed,
    /// Attach failed; the store is unusable.
    Faulted,
}

pub struct FuseStore {
    selector: u32,
    fuses: Box<[u32; FUSE_COUNT]>,
    valid_count: u16,
    backing: Option<Box<dyn PersistentMedium>>,
    read_only: bool,
    state: AttachState,
}

/// Contents staged from a medium before they are committed to the store.
struct Loaded {
    read_only: bool,
    valid_count: u16,
    fuses: Box<[u32; FUSE_COUNT]>,
}

impl FuseStore {
    pub fn new() -> Self {
        FuseStore {
            selector: 0,
            fuses: Box::new([0; FUSE_COUNT]),
            valid_count: 0,
            backing: None,
            read_only: false,
            state: AttachState::Unattached,
        }
    }

    /// Attach an optional backing medium.
    ///
    /// Without a medium the store stays unpopulated until [`reset`](Self::reset).
    /// With one, the medium's contents become the fuse array. Any failure
    /// leaves the store [`Faulted`](AttachState::Faulted) with nothing loaded.
    pub fn attach(&mut self, medium: Option<Box<dyn PersistentMedium>>) -> Result<(), AttachError> {
        if self.state != AttachState::Unattached {
            return Err(AttachError::AlreadyAttached);
        }

        let Some(mut medium) = medium else {
            debug!("OTP attached without drive, fuses unpopulated until reset");
            self.state = AttachState::Volatile;
            return Ok(());
        };

        match Self::load(&mut *medium) {
            Ok(loaded) => {
                debug!(
                    fuses = loaded.valid_count,
                    read_only = loaded.read_only,
                    "OTP fuses loaded from drive"
                );
                self.fuses = loaded.fuses;
                self.valid_count = loaded.valid_count;
                self.read_only = loaded.read_only;
                self.backing = Some(medium);
                self.state = AttachState::Backed;
                Ok(())
            }
            Err(e) => {
                self.valid_count = 0;
                self.state = AttachState::Faulted;
                Err(e)
            }
        }
    }

    fn load(medium: &mut dyn PersistentMedium) -> Result<Loaded, AttachError> {
        let read_only = !medium.query_write_capability();
        medium
            .request_permissions(true, !read_only)
            .map_err(AttachError::PermissionDenied)?;

        let len = medium.length().map_err(AttachError::SizeQueryFailed)?;
        let count = len.div_ceil(4);
        if count > FUSE_COUNT as u64 {
            return Err(AttachError::MediumTooLarge { fuses: count, max: FUSE_COUNT });
        }

        // Trailing partial word stays zero-padded
        let mut bytes = vec![0u8; count as usize * 4];
        medium
            .read_all(&mut bytes[..len as usize])
            .map_err(AttachError::LoadFailed)?;

        let mut fuses = Box::new([0u32; FUSE_COUNT]);
        for (word, chunk) in fuses.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Loaded { read_only, valid_count: count as u16, fuses })
    }

    /// Power-on reset. Only an unbacked array changes; the selector is kept.
    pub fn reset(&mut self) {
        match self.state {
            AttachState::Unattached | AttachState::Volatile => {
                // Antifuse: no history means all zeros, fully addressable
                self.fuses.fill(0);
                self.valid_count = FUSE_COUNT as u16;
                debug!("OTP fuse array reset to antifuse default");
            }
            AttachState::Backed | AttachState::Faulted => {}
        }
    }

    pub fn selector(&self) -> u32 {
        self.selector
    }

    /// Select a fuse. Not bounds-checked; a bad index surfaces on the next data access.
    pub fn select(&mut self, index: u32) {
        self.selector = index;
    }

    pub fn valid_count(&self) -> u16 {
        self.valid_count
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    pub fn is_backed(&self) -> bool {
        self.backing.is_some()
    }

    #[inline]
    fn in_bounds(&self, index: u32) -> bool {
        (index as usize) < self.valid_count as usize
    }

    /// Value of fuse `index`, or `None` if it is not addressable.
    pub fn fuse(&self, index: u32) -> Option<u32> {
        self.in_bounds(index).then(|| self.fuses[index as usize])
    }

    /// The addressable part of the fuse array.
    pub fn fuses(&self) -> &[u32] {
        &self.fuses[..self.valid_count as usize]
    }

    /// Read the selected fuse.
    pub fn read_selected(&self) -> Result<u32, AccessError> {
        self.fuse(self.selector)
            .ok_or(AccessError::ReadOutOfBounds { selector: self.selector })
    }

    /// OR the low 32 bits of `value` into the selected fuse and persist it.
    ///
    /// A persistence failure is returned as [`AccessError::WriteThrough`]; the
    /// in-memory word keeps the new bits either way.
    pub fn write_selected(&mut self, value: u64) -> Result<(), AccessError> {
        let selector = self.selector;
        if !self.in_bounds(selector) {
            return Err(AccessError::WriteOutOfBounds { selector, value });
        }

        let word = &mut self.fuses[selector as usize];
        *word |= value as u32;
        let word = *word;

        if !self.read_only {
            if let Some(medium) = self.backing.as_mut() {
                medium
                    .write_at(selector as u64 * 4, &word.to_le_bytes())
                    .map_err(|source| AccessError::WriteThrough { selector, source })?;
            }
        }
        Ok(())
    }

    /// Give up the store and hand back its medium, if any.
    pub fn into_medium(self) -> Option<Box<dyn PersistentMedium>> {
        self.backing
    }

    /// Capture the migratable state: selector, fuse array and valid count.
    pub fn save_state(&self) -> OtpState {
        OtpState {
            selector: self.selector,
            fuses: self.fuses.to_vec(),
            valid_count: self.valid_count,
        }
    }

    /// Restore state captured by [`save_state`](Self::save_state).
    ///
    /// The medium is not written; it is expected to already hold these contents.
    /// A drive-backed or faulted store keeps the fuse count it got at attach, so
    /// a state with a different count is rejected.
    pub fn load_state(&mut self, s: OtpState) -> Result<(), SnapshotError> {
        if s.valid_count as usize > FUSE_COUNT {
            return Err(SnapshotError::Corrupt("valid fuse count exceeds array size"));
        }
        if matches!(self.state, AttachState::Backed | AttachState::Faulted)
            && s.valid_count != self.valid_count
        {
            return Err(SnapshotError::Corrupt("valid fuse count does not match attached drive"));
        }
        let fuses: Box<[u32; FUSE_COUNT]> = s
            .fuses
            .into_boxed_slice()
            .try_into()
            .map_err(|_| SnapshotError::Corrupt("fuse array length mismatch"))?;
        self.selector = s.selector;
        self.fuses = fuses;
        self.valid_count = s.valid_count;
        Ok(())
    }
}

impl Default for FuseStore {
    fn default() -> Self {
        Self::new()
    }
}
