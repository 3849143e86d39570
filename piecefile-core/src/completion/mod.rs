//! Piece completion tracking.
//!
//! A fixed-capacity bitmap recording which pieces have been durably written,
//! plus a claim set used to hand out pieces to fetchers without duplicates.

pub mod codec;
pub mod index;

use std::fmt;

pub use index::CompletionIndex;

/// Zero-based index of a piece within a file.
///
/// Files are divided into fixed-size pieces (the last one possibly shorter),
/// addressed by sequential indices starting from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for PieceIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by the completion index.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Index lies outside `[0, capacity)`
    #[error("Piece {index} out of bounds (capacity {capacity})")]
    OutOfBounds {
        /// Offending piece index
        index: PieceIndex,
        /// Number of pieces tracked by the index
        capacity: u32,
    },

    /// Persisted bitmap could not be decoded
    #[error("Corrupt completion index: {reason}")]
    CorruptIndex {
        /// What was wrong with the encoded data
        reason: String,
    },

    /// Reading or writing the persisted form failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
