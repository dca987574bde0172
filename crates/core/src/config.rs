//! OTP controller configuration.

use std::path::PathBuf;

use crate::error::BoardError;
use crate::medium::{FileMedium, PersistentMedium};

/// How the board should back its OTP controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpConfig {
    /// Fuse image file. `None` runs the controller volatile (antifuse default).
    pub drive: Option<PathBuf>,
    /// Open the drive read-only; writes then stay in memory.
    pub read_only: bool,
}

impl OtpConfig {
    pub fn with_drive(path: impl Into<PathBuf>) -> Self {
        OtpConfig { drive: Some(path.into()), read_only: false }
    }

    /// Open the configured drive, if any.
    pub fn open_medium(&self) -> Result<Option<Box<dyn PersistentMedium>>, BoardError> {
        let Some(path) = &self.drive else {
            return Ok(None);
        };
        let medium = FileMedium::open(path, self.read_only)
            .map_err(|source| BoardError::Drive { path: path.clone(), source })?;
        Ok(Some(Box::new(medium)))
    }
}
