//! Save state for the OTP controller.
//!
//! Captures the migratable controller state (selector, full fuse array, valid
//! fuse count) so a session can be suspended and resumed without touching the
//! backing drive. Serialized with bincode and deflate-compressed.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "MOTP"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SnapshotError;

/// Magic bytes identifying an OTP state file.
const MAGIC: &[u8; 4] = b"MOTP";
/// Current state file format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;
/// Upper bound on the inflated payload; a full state is a little over 4 KiB.
const MAX_PAYLOAD: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpState {
    pub selector: u32,
    /// Entire fuse array, including words past `valid_count`.
    pub fuses: Vec<u32>,
    pub valid_count: u16,
}

/// Encode a state into the on-disk byte format.
pub fn encode(state: &OtpState) -> Result<Vec<u8>, SnapshotError> {
    let payload = bincode::serialize(state).map_err(SnapshotError::Serialize)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode bytes produced by [`encode`], verifying magic and version.
pub fn decode(data: &[u8]) -> Result<OtpState, SnapshotError> {
    if data.len() < HEADER_LEN {
        return Err(SnapshotError::Truncated);
    }
    if &data[0..4] != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion { found: version, expected: FORMAT_VERSION });
    }

    let decompressed =
        miniz_oxide::inflate::decompress_to_vec_with_limit(&data[HEADER_LEN..], MAX_PAYLOAD)
        .map_err(|e| SnapshotError::Decompress(format!("{:?}", e)))?;

    bincode::deserialize(&decompressed).map_err(SnapshotError::Deserialize)
}

/// Save state to file with header and deflate compression.
pub fn save_to_file(state: &OtpState, path: &Path) -> Result<(), SnapshotError> {
    std::fs::write(path, encode(state)?)?;
    Ok(())
}

/// Load state from file, verifying magic and version.
pub fn load_from_file(path: &Path) -> Result<OtpState, SnapshotError> {
    decode(&std::fs::read(path)?)
}
