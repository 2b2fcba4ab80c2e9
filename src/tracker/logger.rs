//! Logging setup for the price tracker.

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::error::FeedError;
use super::setting::Settings;
use super::utility::get_folder_path;

/// Log level constants (numeric levels as used in the setting file)
pub const DEBUG: i32 = 10;
pub const INFO: i32 = 20;
pub const WARNING: i32 = 30;
pub const ERROR: i32 = 40;
pub const CRITICAL: i32 = 50;

/// Convert integer log level to tracing Level
pub fn level_from_int(level: i32) -> Level {
    match level {
        0..=10 => Level::DEBUG,
        11..=20 => Level::INFO,
        21..=30 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Convert integer log level to string
pub fn level_to_string(level: i32) -> &'static str {
    match level {
        0..=10 => "DEBUG",
        11..=20 => "INFO",
        21..=30 => "WARNING",
        31..=40 => "ERROR",
        _ => "CRITICAL",
    }
}

/// Initialize the global subscriber from the `log.*` settings.
///
/// `RUST_LOG` directives are honoured on top of `log.level`.
pub fn init_logger(settings: &Settings) -> Result<(), FeedError> {
    if !settings.get_bool("log.active").unwrap_or(true) {
        return Ok(());
    }

    let log_level = settings.get_int("log.level").unwrap_or(INFO as i64) as i32;
    let log_console = settings.get_bool("log.console").unwrap_or(true);
    let log_file = settings.get_bool("log.file").unwrap_or(true);

    let filter = EnvFilter::from_default_env()
        .add_directive(level_from_int(log_level).into());

    let console_layer = log_console.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true)
    });

    let file_layer = if log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(get_log_file_path())?;
        Some(
            fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!("Logger initialized at {}", level_to_string(log_level));
    Ok(())
}

/// Get the log file path for today
fn get_log_file_path() -> PathBuf {
    let log_folder = get_folder_path("log");
    let today = Local::now().format("%Y%m%d").to_string();
    let filename = format!("tracker_{}.log", today);
    let path = log_folder.join(filename);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_int() {
        assert_eq!(level_from_int(DEBUG), Level::DEBUG);
        assert_eq!(level_from_int(INFO), Level::INFO);
        assert_eq!(level_from_int(WARNING), Level::WARN);
        assert_eq!(level_from_int(ERROR), Level::ERROR);
    }

    #[test]
    fn test_level_to_string() {
        assert_eq!(level_to_string(DEBUG), "DEBUG");
        assert_eq!(level_to_string(INFO), "INFO");
        assert_eq!(level_to_string(WARNING), "WARNING");
        assert_eq!(level_to_string(ERROR), "ERROR");
        assert_eq!(level_to_string(CRITICAL), "CRITICAL");
    }

    #[test]
    fn test_log_file_name() {
        let path = get_log_file_path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("tracker_"));
        assert!(name.ends_with(".log"));
    }
}
