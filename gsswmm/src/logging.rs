//! File logging for the bridge.
//!
//! The host loads the bridge as a library, so there is no console to write to. Events are
//! written to a plain-text file, and the level follows the `loggingLevel` of the last mapping
//! file loaded.

use crate::mapping::LoggingLevel;
use std::{fs::File, path::Path, sync::Mutex, sync::OnceLock};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, reload, Registry};

static LEVEL: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

impl From<LoggingLevel> for LevelFilter {
    fn from(level: LoggingLevel) -> Self {
        match level {
            LoggingLevel::Off => LevelFilter::OFF,
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Installs the global subscriber writing to `path`, truncating any previous log.
///
/// Returns `false` if the log file cannot be created or another global subscriber is already
/// installed. The bridge then runs without a log.
pub fn init(path: &Path) -> bool {
    if LEVEL.get().is_some() {
        return true;
    }
    let file = match File::create(path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let (filter, handle) = reload::Layer::new(LevelFilter::from(LoggingLevel::default()));
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));
    if tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_err()
    {
        return false;
    }
    let _ = LEVEL.set(handle);
    tracing::info!("bridge version {} logging to {}", crate::VERSION, path.display());
    true
}

/// Changes the level of the bridge log. Does nothing if [`init`] did not install a subscriber.
pub fn apply(level: LoggingLevel) {
    if let Some(handle) = LEVEL.get() {
        if handle.reload(LevelFilter::from(level)).is_ok() {
            tracing::debug!("log level set to {level}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(LevelFilter::OFF, LevelFilter::from(LoggingLevel::Off));
        assert_eq!(LevelFilter::ERROR, LevelFilter::from(LoggingLevel::Error));
        assert_eq!(LevelFilter::INFO, LevelFilter::from(LoggingLevel::default()));
        assert_eq!(LevelFilter::DEBUG, LevelFilter::from(LoggingLevel::Debug));
    }
}
