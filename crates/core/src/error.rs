//! Error types for the OTP controller, its backing medium, and the bus.
//!
//! Attach-time errors ([`AttachError`]) are fatal for the device instance.
//! Runtime errors ([`AccessError`], [`BusError`]) are reported and absorbed
//! at the register interface or router; they never take down the host.

use thiserror::Error;

/// Failure reported by a [`PersistentMedium`](crate::medium::PersistentMedium).
#[derive(Debug, Error)]
pub enum MediumError {
    #[error("medium does not grant {0} permission")]
    PermissionDenied(&'static str),

    #[error("short read: wanted {wanted} bytes, medium holds {available}")]
    ShortRead { wanted: usize, available: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal configuration error raised while attaching a backing medium.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("failed to acquire medium permissions: {0}")]
    PermissionDenied(#[source] MediumError),

    #[error("failed to query medium size: {0}")]
    SizeQueryFailed(#[source] MediumError),

    #[error("specified OTP backend exceeds maximum size of {max} fuses ({fuses} requested)")]
    MediumTooLarge { fuses: u64, max: usize },

    #[error("failed to initialize OTP from drive: {0}")]
    LoadFailed(#[source] MediumError),

    #[error("OTP controller was already attached")]
    AlreadyAttached,
}

/// Runtime fault detected while servicing a register access.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("invalid register {dir} access: register address: {offset:#x}")]
    InvalidRegister { dir: &'static str, offset: u64 },

    #[error("out of bounds OTP fuse read: fuse array index: {selector:#x}")]
    ReadOutOfBounds { selector: u32 },

    #[error("out of bounds OTP fuse write: fuse array index: {selector:#x}, value: {value:#x}")]
    WriteOutOfBounds { selector: u32, value: u64 },

    /// The fuse word was updated in memory but could not be persisted.
    #[error("failed to persist fuse {selector:#x}: {source}")]
    WriteThrough {
        selector: u32,
        #[source]
        source: MediumError,
    },
}

/// Error raised by the address-space router.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("no device mapped at {addr:#x}")]
    Unmapped { addr: u64 },

    #[error("invalid {size}-byte access at {addr:#x}")]
    InvalidAccessSize { addr: u64, size: u32 },

    #[error("window {base:#x}+{size:#x} overlaps an existing mapping")]
    Overlap { base: u64, size: u64 },
}

/// Error raised while saving or restoring controller state.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("serialize error: {0}")]
    Serialize(#[source] bincode::Error),

    #[error("deserialize error: {0}")]
    Deserialize(#[source] bincode::Error),

    #[error("decompress error: {0}")]
    Decompress(String),

    #[error("file too small")]
    Truncated,

    #[error("invalid OTP state file (bad magic)")]
    BadMagic,

    #[error("unsupported OTP state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("corrupt OTP state: {0}")]
    Corrupt(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised while assembling the board around the OTP controller.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("failed to open OTP drive {}: {source}", path.display())]
    Drive {
        path: std::path::PathBuf,
        #[source]
        source: MediumError,
    },

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Map(#[from] BusError),
}
