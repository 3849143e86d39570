//! Tracing setup for Piecefile
//!
//! Console output follows the user-selected level for piecefile's own
//! targets. A second layer writes the assembly trace (piece writes, detector
//! wake-ups, finalize steps) to the log file named by `LoggingConfig`.

use std::fs::{File, create_dir_all};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;
use crate::{PiecefileError, Result};

/// Crate targets whose events the console shows at the selected level.
const PIECEFILE_TARGETS: &[&str] = &["piecefile_core", "piecefile"];

/// Installs the global subscriber and returns the trace log path, if any.
///
/// `RUST_LOG` overrides the console filter when set.
///
/// # Errors
///
/// - `PiecefileError::Io` - If the log directory or file cannot be created
/// - `PiecefileError::Configuration` - If a global subscriber is already installed
pub fn init_tracing(console_level: Level, logging: &LoggingConfig) -> Result<Option<PathBuf>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));
    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let log_file_path = logging.log_file_path();
    let file_layer = match &log_file_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let log_file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(Mutex::new(log_file))
                    .with_filter(EnvFilter::new(logging.file_level.to_string())),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PiecefileError::Configuration {
            reason: format!("tracing already initialized: {e}"),
        })?;

    match &log_file_path {
        Some(path) => tracing::debug!(
            "Tracing initialized: console={console_level}, trace log={} ({})",
            path.display(),
            logging.file_level
        ),
        None => tracing::debug!("Tracing initialized: console={console_level}, no trace log"),
    }

    Ok(log_file_path)
}

/// Console filter: piecefile targets at `level`, everything else at warn.
fn console_directives(level: Level) -> String {
    let mut directives = String::from("warn");
    for target in PIECEFILE_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Failed verification and I/O errors only
    Error,
    Warn,
    /// Assembly progress and finish outcome
    Info,
    /// Every piece write and finalize step
    Debug,
    /// Detector wake-ups
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use piecefile_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
