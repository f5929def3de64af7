//! Logging backend for the `log` facade
//!
//! The driver logs through `log::*!` macros only. Firmware that wants to
//! see the output registers a `core::fmt::Write` sink (usually a UART
//! writer) with [`init`]; until then records are dropped.
//!
//! Level tags are coloured with ANSI escapes when the `ansi-log` feature
//! is enabled.

use core::fmt::{self, Write};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::Mutex;

type Sink = &'static mut (dyn Write + Send);

/// Logger writing formatted records into a registered sink
struct SinkLogger {
    sink: Mutex<Option<Sink>>,
}

static LOGGER: SinkLogger = SinkLogger {
    sink: Mutex::new(None),
};

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Drop the record rather than deadlock if we interrupted a writer
        if let Some(mut guard) = self.sink.try_lock() {
            if let Some(sink) = guard.as_mut() {
                let _ = write_record(&mut **sink, record);
            }
        }
    }

    fn flush(&self) {}
}

fn level_tag(level: Level) -> &'static str {
    if cfg!(feature = "ansi-log") {
        match level {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn => "\x1b[33mWARN\x1b[0m ",
            Level::Info => "\x1b[32mINFO\x1b[0m ",
            Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            Level::Trace => "\x1b[35mTRACE\x1b[0m",
        }
    } else {
        match level {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

/// Format one record as `[LEVEL] target: message\n`
fn write_record(out: &mut dyn Write, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "[{}] {}: {}",
        level_tag(record.level()),
        record.target(),
        record.args()
    )
}

/// Install the logger with `sink` as output
///
/// Fails if another logger was already installed for this program; the
/// sink registered by the first successful call is kept.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    *LOGGER.sink.lock() = Some(sink);
    log::set_max_level(level);
    Ok(())
}

/// Change the maximum level at runtime
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}
