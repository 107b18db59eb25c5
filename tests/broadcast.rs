//! Integration tests for shipping the job configuration to workers.

use log::{Level, LevelFilter, Log, Metadata, Record};
use sparser::config::keys;
use sparser::*;
use std::io::ErrorKind;
use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};

/// Records every log entry together with the thread that emitted it, so tests
/// running in parallel only see their own entries.
struct CaptureLogger {
    entries: Mutex<Vec<(ThreadId, Level, String)>>,
}

static LOGGER: CaptureLogger = CaptureLogger {
    entries: Mutex::new(Vec::new()),
};
static INIT: Once = Once::new();

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.entries.lock().unwrap().push((
            thread::current().id(),
            record.level(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

fn install_logger() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

fn errors_logged_by_this_thread() -> Vec<String> {
    let me = thread::current().id();
    LOGGER
        .entries
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, level, _)| *id == me && *level == Level::Error)
        .map(|(_, _, message)| message.clone())
        .collect()
}

fn sample_conf() -> JobConf {
    let mut conf = JobConf::new();
    conf.set(keys::OUTPUT_COMPRESS, true);
    conf.set(keys::OUTPUT_COMPRESSION_CODEC, "gzip");
    conf.set(keys::ENGINE_PORT, 9005);
    conf.set("host.user.setting", "ünïcödé value");
    conf
}

#[test]
fn test_round_trip_yields_equal_copy() -> anyhow::Result<()> {
    let original = BroadcastConfig::new(sample_conf());
    let bytes = original.serialize()?;
    let restored = BroadcastConfig::<JobConf>::deserialize(&bytes)?;

    assert_eq!(restored.value(), original.value());
    assert!(!std::ptr::eq(restored.value(), original.value()));
    Ok(())
}

#[test]
fn test_empty_configuration_round_trips() -> anyhow::Result<()> {
    let bytes = BroadcastConfig::new(JobConf::new()).serialize()?;
    let restored = BroadcastConfig::<JobConf>::deserialize(&bytes)?;
    assert!(restored.into_inner().is_empty());
    Ok(())
}

#[test]
fn test_corrupt_payload_is_one_io_error_and_one_log_entry() -> anyhow::Result<()> {
    install_logger();
    let mut bytes = BroadcastConfig::new(sample_conf()).serialize()?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let before = errors_logged_by_this_thread().len();
    let err = BroadcastConfig::<JobConf>::deserialize(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.to_string().contains("digest"));

    let logged = errors_logged_by_this_thread();
    assert_eq!(logged.len() - before, 1, "{logged:?}");
    Ok(())
}

#[test]
fn test_bad_magic_and_version_are_rejected() -> anyhow::Result<()> {
    let bytes = BroadcastConfig::new(sample_conf()).serialize()?;

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    let err = BroadcastConfig::<JobConf>::deserialize(&bad_magic).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);

    let mut bad_version = bytes;
    bad_version[4] = 99;
    let err = BroadcastConfig::<JobConf>::deserialize(&bad_version).unwrap_err();
    assert!(err.to_string().contains("version"));
    Ok(())
}

#[test]
fn test_io_failure_keeps_its_kind() {
    install_logger();
    let before = errors_logged_by_this_thread().len();

    let err = BroadcastConfig::<JobConf>::deserialize(b"SPBC").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    assert_eq!(errors_logged_by_this_thread().len() - before, 1);
}

#[test]
fn test_embeds_in_serde_transport() -> anyhow::Result<()> {
    let original = BroadcastConfig::new(sample_conf());

    let json = serde_json::to_string(&original)?;
    let restored: BroadcastConfig = serde_json::from_str(&json)?;
    assert_eq!(restored.value(), original.value());

    let packed = postcard::to_allocvec(&original)?;
    let restored: BroadcastConfig = postcard::from_bytes(&packed)?;
    assert_eq!(restored.value(), original.value());
    Ok(())
}

#[test]
fn test_corrupt_frame_fails_serde_transport() -> anyhow::Result<()> {
    let mut frame = BroadcastConfig::new(sample_conf()).serialize()?;
    frame.truncate(frame.len() - 2);
    let json = serde_json::to_string(&frame)?;
    assert!(serde_json::from_str::<BroadcastConfig>(&json).is_err());
    Ok(())
}

/// A configuration whose fields cannot be written.
#[derive(Debug, Default)]
struct Unwritable {
    io_failure: bool,
}

impl Writable for Unwritable {
    fn write_fields(&self, _out: &mut dyn std::io::Write) -> SparserResult<()> {
        if self.io_failure {
            Err(SparserError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                "sink is full",
            )))
        } else {
            Err(SparserError::internal("fields are not encodable"))
        }
    }

    fn read_fields(&mut self, _input: &mut dyn std::io::Read) -> SparserResult<()> {
        Ok(())
    }
}

#[test]
fn test_serialize_failure_is_one_io_error_and_one_log_entry() {
    install_logger();
    let before = errors_logged_by_this_thread().len();

    let err = BroadcastConfig::new(Unwritable::default())
        .serialize()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(err.to_string().contains("not encodable"));

    let logged = errors_logged_by_this_thread();
    assert_eq!(logged.len() - before, 1, "{logged:?}");
}

#[test]
fn test_serialize_io_failure_keeps_its_kind() {
    install_logger();
    let before = errors_logged_by_this_thread().len();

    let err = BroadcastConfig::new(Unwritable { io_failure: true })
        .serialize()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteZero);
    assert_eq!(errors_logged_by_this_thread().len() - before, 1);
}
