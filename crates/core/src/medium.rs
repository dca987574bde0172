//! Persistent backing media for the fuse array.
//!
//! A medium is a flat byte store addressed from offset 0. The fuse store
//! reads it once at attach time and writes single 4-byte words back on every
//! in-bounds data write. Two implementations are provided:
//!
//! - [`FileMedium`]: a host file (the board's `otp` drive)
//! - [`MemMedium`]: a shared in-memory buffer, used by tools and tests

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::MediumError;

/// Byte-addressable persistent store backing a fuse array.
///
/// All I/O is fallible; callers must never assume a read or write succeeded.
pub trait PersistentMedium: Send {
    /// Whether the medium can be opened for writing at all.
    fn query_write_capability(&self) -> bool;

    /// Ask the medium for read and (optionally) write access.
    fn request_permissions(&mut self, read: bool, write: bool) -> Result<(), MediumError>;

    /// Current length of the medium in bytes.
    fn length(&self) -> Result<u64, MediumError>;

    /// Fill `buf` with the first `buf.len()` bytes of the medium.
    fn read_all(&mut self, buf: &mut [u8]) -> Result<(), MediumError>;

    /// Write `bytes` starting at byte `offset`, extending the medium if needed.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), MediumError>;
}

/// Host file used as the OTP drive.
pub struct FileMedium {
    file: File,
    path: PathBuf,
    writable: bool,
    write_granted: bool,
}

impl FileMedium {
    /// Open `path` as a fuse image.
    ///
    /// Unless `read_only` is set the file is opened read-write; if the host
    /// refuses write access it falls back to a read-only handle.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, MediumError> {
        let path = path.as_ref();
        if !read_only {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => return Ok(Self::with_file(file, path, true)),
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    debug!(path = %path.display(), "OTP drive not writable, opening read-only");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let file = File::open(path)?;
        Ok(Self::with_file(file, path, false))
    }

    fn with_file(file: File, path: &Path, writable: bool) -> Self {
        FileMedium { file, path: path.to_path_buf(), writable, write_granted: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentMedium for FileMedium {
    fn query_write_capability(&self) -> bool {
        self.writable
    }

    fn request_permissions(&mut self, _read: bool, write: bool) -> Result<(), MediumError> {
        if write && !self.writable {
            return Err(MediumError::PermissionDenied("write"));
        }
        self.write_granted = write;
        Ok(())
    }

    fn length(&self) -> Result<u64, MediumError> {
        Ok(self.file.metadata()?.len())
    }

    fn read_all(&mut self, buf: &mut [u8]) -> Result<(), MediumError> {
        self.file.seek(SeekFrom::Start(0))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(MediumError::ShortRead {
                wanted: buf.len(),
                available: self.length()?,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), MediumError> {
        if !self.write_granted {
            return Err(MediumError::PermissionDenied("write"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        Ok(())
    }
}

/// In-memory medium. Clones share the same buffer, so a caller can keep a
/// handle to inspect what the controller persisted.
#[derive(Clone)]
pub struct MemMedium {
    data: Arc<Mutex<Vec<u8>>>,
    writable: bool,
    write_granted: bool,
}

impl MemMedium {
    pub fn new(data: Vec<u8>) -> Self {
        MemMedium { data: Arc::new(Mutex::new(data)), writable: true, write_granted: false }
    }

    /// A medium that reports no write capability.
    pub fn read_only(data: Vec<u8>) -> Self {
        MemMedium { writable: false, ..Self::new(data) }
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistentMedium for MemMedium {
    fn query_write_capability(&self) -> bool {
        self.writable
    }

    fn request_permissions(&mut self, _read: bool, write: bool) -> Result<(), MediumError> {
        if write && !self.writable {
            return Err(MediumError::PermissionDenied("write"));
        }
        self.write_granted = write;
        Ok(())
    }

    fn length(&self) -> Result<u64, MediumError> {
        Ok(self.lock().len() as u64)
    }

    fn read_all(&mut self, buf: &mut [u8]) -> Result<(), MediumError> {
        let data = self.lock();
        if buf.len() > data.len() {
            return Err(MediumError::ShortRead { wanted: buf.len(), available: data.len() as u64 });
        }
        buf.copy_from_slice(&data[..buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), MediumError> {
        if !self.write_granted {
            return Err(MediumError::PermissionDenied("write"));
        }
        let start = usize::try_from(offset).map_err(|_| out_of_range(offset))?;
        let end = start.checked_add(bytes.len()).ok_or_else(|| out_of_range(offset))?;
        let mut data = self.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

fn out_of_range(offset: u64) -> MediumError {
    MediumError::Io(std::io::Error::new(
        ErrorKind::InvalidInput,
        format!("write offset {:#x} out of range", offset),
    ))
}
