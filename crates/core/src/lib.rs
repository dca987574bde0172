//! # migv-otp-core
//!
//! Emulation core for the one-time-programmable (OTP) fuse controller of the
//! MiG-V RISC-V SoC.
//!
//! The controller exposes a 4 KiB register window holding two registers: a
//! fuse selector and a data port. Behind it sits an array of 1024 32-bit fuse
//! words that can only accumulate set bits. The array may be backed by a
//! persistent drive; without one it starts all-zero after reset.
//!
//! ## Architecture
//!
//! - [`FuseStore`]: fuse array, valid count, selector, optional backing medium
//! - [`peripherals::OtpCtrl`]: register decode in front of the store
//! - [`peripherals::MmioDevice`] / [`peripherals::Lifecycle`]: device contracts
//! - [`bus::AddressSpace`]: routes physical accesses, enforces access widths
//! - [`medium`]: [`PersistentMedium`] contract, file and in-memory media
//! - [`board`]: places the controller at its SoC address
//! - [`savestate`]: suspend/resume of controller state
//!
//! ## Diagnostics
//!
//! Guest misbehaviour (undecoded registers, out-of-range fuses, bad access
//! widths) is logged through `tracing` at `WARN` under the [`GUEST_ERROR`]
//! target and never aborts emulation.

pub mod board;
pub mod bus;
pub mod config;
pub mod error;
pub mod fuse_store;
pub mod medium;
pub mod peripherals;
pub mod savestate;

pub use board::Board;
pub use config::OtpConfig;
pub use error::{AccessError, AttachError, BoardError, BusError, MediumError, SnapshotError};
pub use fuse_store::{AttachState, FuseStore};
pub use medium::{FileMedium, MemMedium, PersistentMedium};

/// Number of fuse words in the array (4 KiB of fuses)
pub const FUSE_COUNT: usize = 0x400;

/// `tracing` target for guest-visible errors.
pub const GUEST_ERROR: &str = "guest_error";
