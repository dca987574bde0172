//! MiG-V OTP fuse tool.
//!
//! Builds the emulated OTP controller exactly as the board does (optional
//! drive, attach, power-on reset, 4 KiB window at `0x0041_0000`) and drives it
//! through the selector/data register protocol.
//!
//! ```text
//! migv-otp --drive otp.bin info
//! migv-otp --drive otp.bin write 0x10 0x8000_0000
//! migv-otp --drive otp.bin dump --all
//! migv-otp save-state otp.state
//! ```
//!
//! Set `RUST_LOG` (or pass `-v`) to see controller diagnostics on stderr.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use migv_otp_core::board::OTP_BASE;
use migv_otp_core::{savestate, Board, OtpConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "migv-otp", version, about = "Inspect and program MiG-V OTP fuse images")]
struct Cli {
    /// Fuse image backing the controller; omit for a volatile all-zero array
    #[arg(long, global = true)]
    drive: Option<PathBuf>,

    /// Open the drive read-only (writes are not persisted)
    #[arg(long, global = true)]
    read_only: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show controller configuration and fuse count
    Info,
    /// Read one fuse
    Read {
        #[arg(value_parser = parse_u32)]
        index: u32,
    },
    /// OR a value into one fuse
    Write {
        #[arg(value_parser = parse_u32)]
        index: u32,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// List fuses (non-zero only unless --all)
    Dump {
        #[arg(long)]
        all: bool,
    },
    /// Save controller state to a file
    SaveState { path: PathBuf },
    /// Restore controller state from a file and list it
    LoadState { path: PathBuf },
}

/// Parse a decimal or `0x`-prefixed hex number; `_` separators allowed.
fn parse_u32(s: &str) -> Result<u32, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(&digits.replace('_', ""), radix)
        .map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ─── Commands ───────────────────────────────────────────────────────────────

fn check_index(board: &Board, index: u32) -> Result<()> {
    let valid = board.otp().store().valid_count();
    if index >= valid as u32 {
        bail!("fuse index {:#x} out of range (controller has {} fuses)", index, valid);
    }
    Ok(())
}

fn dump(board: &mut Board, all: bool, out: &mut impl Write) -> Result<()> {
    let valid = board.otp().store().valid_count() as u32;
    for index in 0..valid {
        let value = board.read_fuse(index)?;
        if all || value != 0 {
            writeln!(out, "{:#05x}: {:#010x}", index, value)?;
        }
    }
    Ok(())
}

fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    debug!(command = ?cli.command, drive = ?cli.drive, "running command");
    let config = OtpConfig { drive: cli.drive.clone(), read_only: cli.read_only };
    let mut board = Board::build(&config).context("failed to build OTP controller")?;

    match &cli.command {
        Command::Info => {
            let otp = board.otp();
            let store = otp.store();
            writeln!(out, "base:      {:#010x}", OTP_BASE)?;
            match &config.drive {
                Some(path) => writeln!(out, "drive:     {}", path.display())?,
                None => writeln!(out, "drive:     none (volatile)")?,
            }
            writeln!(out, "read-only: {}", store.read_only())?;
            writeln!(out, "fuses:     {}", store.valid_count())?;
        }
        Command::Read { index } => {
            check_index(&board, *index)?;
            writeln!(out, "{:#010x}", board.read_fuse(*index)?)?;
        }
        Command::Write { index, value } => {
            check_index(&board, *index)?;
            board.program_fuse(*index, *value)?;
            writeln!(out, "{:#010x}", board.read_fuse(*index)?)?;
        }
        Command::Dump { all } => dump(&mut board, *all, out)?,
        Command::SaveState { path } => {
            let state = board.otp().save_state();
            savestate::save_to_file(&state, path)
                .with_context(|| format!("failed to save state to {}", path.display()))?;
        }
        Command::LoadState { path } => {
            let state = savestate::load_from_file(path)
                .with_context(|| format!("failed to load state from {}", path.display()))?;
            board.otp_mut().load_state(state)?;
            dump(&mut board, false, out)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let stdout = std::io::stdout();
    run(&cli, &mut stdout.lock())
}
