//! Piece-addressed file assembly.
//!
//! A `PieceFile` owns the destination file and its completion index, accepts
//! piece writes in any order, and runs a background detector that finalizes
//! the file once every piece is present: size normalization, optional digest
//! verification, then a one-time broadcast to all waiters.

mod detector;
pub mod digest;
pub mod geometry;
mod handle;
pub mod options;

use std::io;

pub use digest::{DigestAlgorithm, ExpectedDigest, compute_file_digest};
pub use geometry::PieceGeometry;
pub use handle::{PieceFile, PieceFileStats};
pub use options::{PieceFileOptions, PieceLayout};

use crate::completion::{CompletionError, PieceIndex};

/// Result of finalization, shared by every waiter.
pub type FinishOutcome = Result<(), FinalizeError>;

/// Errors surfaced synchronously by piece file operations.
#[derive(Debug, thiserror::Error)]
pub enum PieceFileError {
    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Completion index rejected the request
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Piece size and count cannot describe the file
    #[error("Invalid piece geometry: {reason}")]
    InvalidGeometry {
        /// Why the layout was rejected
        reason: String,
    },

    /// Expected digest is not a recognized hex digest
    #[error("Invalid expected digest: {reason}")]
    InvalidDigest {
        /// Why the digest was rejected
        reason: String,
    },

    /// Piece data would spill into the next piece
    #[error("Piece {index} is {len} bytes, larger than piece size {piece_size}")]
    PieceTooLarge {
        /// Piece being written
        index: PieceIndex,
        /// Length of the supplied data
        len: usize,
        /// Configured piece size
        piece_size: u64,
    },

    /// Resumed completion index does not match the piece layout
    #[error("Completion index tracks {actual} pieces, layout has {expected}")]
    IndexMismatch {
        /// Piece count of the layout
        expected: u32,
        /// Capacity of the supplied index
        actual: u32,
    },

    /// Finalization failed
    #[error("Finalization failed: {0}")]
    Finalize(#[from] FinalizeError),
}

/// Failures of the one-time finalize sequence.
///
/// Cloneable so the same outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeError {
    /// Whole-file digest differs from the expected one
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Hex digest supplied at open
        expected: String,
        /// Hex digest of the finished file
        actual: String,
    },

    /// Stat, resize, sync, or read failed
    #[error("{operation} failed: {message}")]
    Io {
        /// Step of the finalize sequence that failed
        operation: &'static str,
        /// Kind of the underlying OS error
        kind: io::ErrorKind,
        /// Display form of the underlying error
        message: String,
    },

    /// Detector task ended without publishing an outcome
    #[error("Completion detector stopped before finalizing")]
    DetectorStopped,
}

impl FinalizeError {
    pub(crate) fn io(operation: &'static str, error: io::Error) -> Self {
        Self::Io {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Returns true if the file was assembled but failed verification.
    pub fn is_hash_mismatch(&self) -> bool {
        matches!(self, FinalizeError::HashMismatch { .. })
    }
}
