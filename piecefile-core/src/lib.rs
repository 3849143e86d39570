//! Piecefile Core - Out-of-order piece assembly for large files
//!
//! This crate tracks incremental completion of a file written in fixed-size
//! pieces delivered in any order: a concurrency-safe completion index, a
//! piece file that accepts index-addressed writes, and a background detector
//! that finalizes and verifies the file exactly once.

pub mod completion;
pub mod config;
pub mod piece_file;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use completion::{CompletionError, CompletionIndex, PieceIndex};
pub use config::PiecefileConfig;
pub use piece_file::{
    DigestAlgorithm, ExpectedDigest, FinalizeError, FinishOutcome, PieceFile, PieceFileError,
    PieceFileOptions, PieceFileStats, PieceGeometry,
};

/// Core errors that can bubble up from any Piecefile subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PiecefileError {
    #[error("Completion index error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Piece file error: {0}")]
    PieceFile(#[from] PieceFileError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PiecefileError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            PiecefileError::Completion(CompletionError::CorruptIndex { reason }) => {
                format!("Saved progress is unreadable: {reason}")
            }
            PiecefileError::Completion(_) => "Piece index error occurred".to_string(),
            PiecefileError::PieceFile(PieceFileError::Finalize(FinalizeError::HashMismatch {
                ..
            })) => "Assembled file does not match the expected hash".to_string(),
            PiecefileError::PieceFile(e) => format!("Piece file error: {e}"),
            PiecefileError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            PiecefileError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PiecefileError::Configuration { .. }
                | PiecefileError::PieceFile(PieceFileError::InvalidGeometry { .. })
                | PiecefileError::PieceFile(PieceFileError::InvalidDigest { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, PiecefileError>;
