use std::io::Write as _;
use std::sync::{Arc, Mutex};

use migv_otp_core::board::{Board, OTP_BASE};
use migv_otp_core::peripherals::otp::{ADDR_DATA, ADDR_SELECTOR};
use migv_otp_core::{AttachError, AttachState, BoardError, FileMedium, FuseStore, OtpConfig};
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn with_log<T>(f: impl FnOnce() -> T) -> (T, String) {
    let cap = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(cap.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let log = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
    (out, log)
}

#[test]
fn volatile_select_write_read_scenario() {
    let mut board = Board::build(&OtpConfig::default()).unwrap();

    board.bus.write(OTP_BASE + ADDR_SELECTOR, 4, 5).unwrap();
    board.bus.write(OTP_BASE + ADDR_DATA, 4, 0x0F).unwrap();
    board.bus.write(OTP_BASE + ADDR_DATA, 4, 0xF0).unwrap();
    assert_eq!(board.bus.read(OTP_BASE + ADDR_DATA, 4).unwrap(), 0xFF);

    let (value, log) = with_log(|| {
        board.bus.write(OTP_BASE + ADDR_SELECTOR, 4, 2000).unwrap();
        board.bus.write(OTP_BASE + ADDR_DATA, 4, 0xFF).unwrap();
        board.bus.read(OTP_BASE + ADDR_DATA, 4).unwrap()
    });
    assert_eq!(value, 0);
    assert!(log.contains("guest_error"), "log: {log}");
    assert!(log.contains("out of bounds OTP fuse write: fuse array index: 0x7d0, value: 0xff"));
    assert!(log.contains("out of bounds OTP fuse read: fuse array index: 0x7d0"));
    assert!(log.contains("WARN"));

    assert_eq!(board.otp().store().fuse(5), Some(0xFF));
    assert!(board.otp().store().fuses().iter().enumerate().all(|(i, &f)| i == 5 || f == 0));
}

#[test]
fn invalid_register_is_logged() {
    let mut board = Board::build(&OtpConfig::default()).unwrap();
    let (value, log) = with_log(|| {
        board.bus.write(OTP_BASE + 0x10, 4, 1).unwrap();
        board.bus.read(OTP_BASE + 0x10, 8).unwrap()
    });
    assert_eq!(value, 0);
    assert!(log.contains("invalid register write access: register address: 0x10"));
    assert!(log.contains("invalid register read access: register address: 0x10"));
}

#[test]
fn file_drive_roundtrip() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    let initial: Vec<u8> = [0x1111_0000u32, 0, 0x0000_0022, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    tmp.write_all(&initial).unwrap();
    tmp.flush().unwrap();

    let cfg = OtpConfig::with_drive(tmp.path());
    {
        let mut board = Board::build(&cfg).unwrap();
        assert_eq!(board.otp().store().valid_count(), 4);
        assert_eq!(board.read_fuse(0).unwrap(), 0x1111_0000);
        board.program_fuse(0, 0x0000_1111).unwrap();
        board.program_fuse(2, 0x0000_0011).unwrap();
    }

    let bytes = std::fs::read(tmp.path()).unwrap();
    assert_eq!(&bytes[0..4], &0x1111_1111u32.to_le_bytes());
    assert_eq!(&bytes[8..12], &0x0000_0033u32.to_le_bytes());

    let mut board = Board::build(&cfg).unwrap();
    assert_eq!(board.read_fuse(0).unwrap(), 0x1111_1111);
    assert_eq!(board.read_fuse(2).unwrap(), 0x33);
    assert_eq!(board.read_fuse(4).unwrap(), 0);
}

#[test]
fn read_only_drive_keeps_file_untouched() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&[0u8; 8]).unwrap();
    tmp.flush().unwrap();

    let cfg = OtpConfig { drive: Some(tmp.path().to_path_buf()), read_only: true };
    let mut board = Board::build(&cfg).unwrap();
    assert!(board.otp().store().read_only());
    board.program_fuse(1, 0xFFFF).unwrap();
    assert_eq!(board.read_fuse(1).unwrap(), 0xFFFF);
    assert_eq!(std::fs::read(tmp.path()).unwrap(), vec![0u8; 8]);
}

#[test]
fn oversized_drive_fails_construction() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&vec![0xFFu8; 4 * 1024 + 4]).unwrap();
    tmp.flush().unwrap();

    match Board::build(&OtpConfig::with_drive(tmp.path())) {
        Err(BoardError::Attach(AttachError::MediumTooLarge { fuses: 1025, max: 1024 })) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("oversized drive accepted"),
    }

    let mut store = FuseStore::new();
    let medium = FileMedium::open(tmp.path(), false).unwrap();
    assert!(store.attach(Some(Box::new(medium))).is_err());
    assert_eq!(store.state(), AttachState::Faulted);
    assert!(store.fuses().is_empty());
}

#[test]
fn unaligned_drive_rounds_up() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&[0xAB, 0xCD, 0xEF, 0x01, 0x02]).unwrap();
    tmp.flush().unwrap();

    let mut board = Board::build(&OtpConfig::with_drive(tmp.path())).unwrap();
    assert_eq!(board.otp().store().valid_count(), 2);
    assert_eq!(board.read_fuse(0).unwrap(), 0x01EF_CDAB);
    assert_eq!(board.read_fuse(1).unwrap(), 0x02);

    board.program_fuse(1, 0x0300).unwrap();
    assert_eq!(std::fs::read(tmp.path()).unwrap(), vec![0xAB, 0xCD, 0xEF, 0x01, 0x02, 0x03, 0, 0]);
}
