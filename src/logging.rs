//! Log routing for host applications.
//!
//! The BLE layer logs through the `log` facade. A host app (the companion
//! UI) injects a [`LogSink`] and installs a [`SinkLogger`] once per process;
//! records are then forwarded as `(level, tag, message)` triples. Without an
//! installed logger, records are dropped silently.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::sync::Arc;

/// Severity passed to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => LogLevel::Error,
            Level::Warn => LogLevel::Warn,
            Level::Info => LogLevel::Info,
            Level::Debug | Level::Trace => LogLevel::Debug,
        }
    }
}

/// Destination for log records, implemented by the host app.
pub trait LogSink: Send + Sync {
    /// Receives one record. `tag` is the module path that produced it.
    fn on_log(&self, level: LogLevel, tag: &str, message: &str);
}

/// A [`LogSink`] that writes timestamped lines to standard error. Used by
/// headless hosts that have no UI log pane.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn on_log(&self, level: LogLevel, tag: &str, message: &str) {
        eprintln!(
            "[{}] [{:?}] {}: {}",
            Local::now().to_rfc3339(),
            level,
            tag,
            message
        );
    }
}

/// Bridges the `log` facade to an injected [`LogSink`].
pub struct SinkLogger {
    sink: Arc<dyn LogSink>,
    level: Level,
}

impl SinkLogger {
    pub fn new(sink: Arc<dyn LogSink>, level: Level) -> Self {
        Self { sink, level }
    }

    /// Installs the logger process-wide. May only succeed once per process;
    /// a second install returns `SetLoggerError`.
    pub fn install(sink: Arc<dyn LogSink>, level: Level) -> Result<(), SetLoggerError> {
        let level_filter = match level {
            Level::Error => LevelFilter::Error,
            Level::Warn => LevelFilter::Warn,
            Level::Info => LevelFilter::Info,
            Level::Debug => LevelFilter::Debug,
            Level::Trace => LevelFilter::Trace,
        };

        log::set_boxed_logger(Box::new(SinkLogger::new(sink, level)))
            .map(|()| log::set_max_level(level_filter))
    }
}

impl Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.sink.on_log(
                record.level().into(),
                record.target(),
                &record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

/// Fallback initialization from `RUST_LOG` for tools and tests that have no
/// sink to inject.
pub fn init_env() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CaptureSink(Mutex<Vec<(LogLevel, String, String)>>);

    impl LogSink for CaptureSink {
        fn on_log(&self, level: LogLevel, tag: &str, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push((level, tag.to_string(), message.to_string()));
        }
    }

    #[test]
    fn forwards_records_to_sink() {
        let sink = Arc::new(CaptureSink(Mutex::new(Vec::new())));
        let logger = SinkLogger::new(sink.clone(), Level::Info);

        let record = Record::builder()
            .args(format_args!("pod connected"))
            .level(Level::Info)
            .target("aivo_ble::ble::connection")
            .build();
        logger.log(&record);

        let captured = sink.0.lock().unwrap();
        assert_eq!(
            *captured,
            vec![(
                LogLevel::Info,
                "aivo_ble::ble::connection".to_string(),
                "pod connected".to_string()
            )]
        );
    }

    #[test]
    fn below_threshold_records_are_dropped() {
        let sink = Arc::new(CaptureSink(Mutex::new(Vec::new())));
        let logger = SinkLogger::new(sink.clone(), Level::Warn);

        let record = Record::builder()
            .args(format_args!("chunk 3/5"))
            .level(Level::Debug)
            .target("aivo_ble::ble::transport")
            .build();
        logger.log(&record);

        assert!(sink.0.lock().unwrap().is_empty());
    }
}
