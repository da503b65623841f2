//! Process-wide logger initialization.
//!
//! A single [`log::Log`] implementation, installed once, writing
//! `[LEVEL file:line] timestamp message` lines to stderr. The level is
//! controlled by the `RUNTIME_LOG_LEVEL` environment variable and otherwise
//! defaults to `debug` in debug builds and `warn` in release builds.

use std::env;
use std::io::{stderr, Write};
use std::str::FromStr;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<RuntimeLogger> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "RUNTIME_LOG_LEVEL";

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Installs the global logger. Safe to call more than once; only the first
/// call takes effect.
pub fn init() {
    let level_filter = env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|s| LevelFilter::from_str(&s).ok())
        .unwrap_or_else(default_level);

    let logger = LOGGER.get_or_init(|| RuntimeLogger {
        level: level_filter.to_level(),
    });

    if log::set_logger(logger).is_ok() {
        log::set_max_level(level_filter);
    }
}

struct RuntimeLogger {
    level: Option<Level>,
}

impl Log for RuntimeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.level {
            Some(level) => metadata.level() <= level,
            None => false,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now().to_rfc3339();
        let line = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!(
                "[{} {}:{}] {} {}",
                record.level(),
                file,
                line,
                now,
                record.args()
            ),
            _ => format!("[{}] {} {}", record.level(), now, record.args()),
        };
        let _ = writeln!(stderr(), "{}", line);
    }

    fn flush(&self) {
        let _ = stderr().flush();
    }
}
