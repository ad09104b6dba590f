#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use common::{shell_settings, FakeBackend};
use ocrdesk_lib::backend::config::BackendSettings;
use ocrdesk_lib::{Host, IsolationBridge};

/// Keeps warn and error records from this crate. One test per binary, since
/// the logger is process global.
struct Capture;

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

impl Log for Capture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn && metadata.target().starts_with("ocrdesk_lib")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            RECORDS
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture;

fn take_records() -> Vec<(Level, String)> {
    std::mem::take(&mut *RECORDS.lock().unwrap())
}

fn count_prefix(records: &[(Level, String)], prefix: &str) -> usize {
    records.iter().filter(|(_, msg)| msg.starts_with(prefix)).count()
}

#[tokio::test]
async fn failed_start_logs_once_per_layer() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Warn);

    // Health check exhaustion
    let backend = FakeBackend::start(None).await;
    let host = Host::attach(
        shell_settings(backend.port, "exec sleep 30", 2),
        IsolationBridge::new(),
    )
    .await
    .unwrap();
    take_records();

    assert!(!host.start_or_degrade().await);

    let records = take_records();
    assert_eq!(count_prefix(&records, "[Health]"), 1, "{:?}", records);
    assert_eq!(count_prefix(&records, "[Startup]"), 1, "{:?}", records);
    assert_eq!(records.len(), 2, "{:?}", records);
    host.shutdown().await;

    // Spawn failure
    let host = Host::attach(
        BackendSettings {
            executable: Some(PathBuf::from("/nonexistent/ocrdesk-backend")),
            working_dir: Some(std::env::temp_dir()),
            args: vec![],
            ..Default::default()
        },
        IsolationBridge::new(),
    )
    .await
    .unwrap();
    take_records();

    assert!(!host.start_or_degrade().await);

    let records = take_records();
    assert_eq!(count_prefix(&records, "[Backend]"), 1, "{:?}", records);
    assert_eq!(count_prefix(&records, "[Startup]"), 1, "{:?}", records);
    assert_eq!(records.len(), 2, "{:?}", records);
}
