//! Centralized configuration for Piecefile.
//!
//! All tunable parameters are defined here and passed into construction
//! explicitly, so nothing depends on hidden process-wide state.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;

/// Central configuration for all Piecefile components.
#[derive(Debug, Clone, Default)]
pub struct PiecefileConfig {
    pub piece_file: PieceFileConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Piece layout and completion detection settings.
#[derive(Debug, Clone)]
pub struct PieceFileConfig {
    /// Interval between completion checks
    pub poll_interval: Duration,
    /// Piece count used when neither piece size nor piece count is given
    pub default_piece_count: u32,
    /// Whether successful piece writes wake the detector before the next tick
    pub wake_on_write: bool,
}

impl Default for PieceFileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            default_piece_count: num_cpus::get().max(1) as u32,
            wake_on_write: true,
        }
    }
}

/// File I/O settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Read buffer size used while hashing the finished file
    pub hash_buffer_size: usize,
    /// Permission bits for newly created files (unix only)
    pub file_mode: u32,
    /// Suffix of the scratch file used while persisting the completion index
    pub temp_file_suffix: &'static str,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hash_buffer_size: 65536, // 64 KiB
            file_mode: 0o644,
            temp_file_suffix: ".tmp",
        }
    }
}

/// Trace log settings used by `init_tracing`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory holding the trace log; `None` disables the file layer
    pub logs_dir: Option<PathBuf>,
    /// Trace log file name, overwritten on every run
    pub file_name: String,
    /// Most verbose level written to the trace log
    pub file_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_dir: Some(PathBuf::from("logs")),
            file_name: "piecefile-last-run.log".to_string(),
            file_level: Level::TRACE,
        }
    }
}

impl LoggingConfig {
    /// Full path of the trace log, or `None` when file logging is off.
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.logs_dir.as_ref().map(|dir| dir.join(&self.file_name))
    }
}

impl PiecefileConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("PIECEFILE_POLL_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.piece_file.poll_interval = Duration::from_millis(millis.max(1));
            }
        }

        if let Ok(count) = std::env::var("PIECEFILE_DEFAULT_PIECE_COUNT") {
            if let Ok(count) = count.parse::<u32>() {
                if count > 0 {
                    config.piece_file.default_piece_count = count;
                }
            }
        }

        if let Ok(size) = std::env::var("PIECEFILE_HASH_BUFFER_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                if size > 0 {
                    config.storage.hash_buffer_size = size;
                }
            }
        }

        // Empty value turns the trace log off
        if let Ok(dir) = std::env::var("PIECEFILE_LOG_DIR") {
            config.logging.logs_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }

        if let Ok(name) = std::env::var("PIECEFILE_LOG_FILE") {
            if !name.is_empty() {
                config.logging.file_name = name;
            }
        }

        if let Ok(level) = std::env::var("PIECEFILE_LOG_FILE_LEVEL") {
            if let Ok(level) = level.parse::<Level>() {
                config.logging.file_level = level;
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Polls quickly so completion is observed without second-long waits.
    pub fn for_testing() -> Self {
        Self {
            piece_file: PieceFileConfig {
                poll_interval: Duration::from_millis(10),
                default_piece_count: 4,
                wake_on_write: true,
            },
            storage: StorageConfig {
                hash_buffer_size: 4096,
                ..Default::default()
            },
            logging: LoggingConfig {
                logs_dir: None,
                ..Default::default()
            },
        }
    }
}
