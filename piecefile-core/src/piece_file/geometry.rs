//! Piece layout arithmetic.

use std::ops::Range;

use serde::Serialize;

use super::PieceFileError;
use super::options::PieceLayout;
use crate::completion::PieceIndex;

/// Size and count of the pieces covering a file.
///
/// `piece_size * piece_count >= total_size` always holds; the excess is cut
/// off when the file is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PieceGeometry {
    /// Target file size in bytes, 0 when unknown
    pub total_size: u64,
    /// Size of every piece except possibly the last
    pub piece_size: u64,
    /// Number of pieces
    pub piece_count: u32,
}

impl PieceGeometry {
    /// Resolves a layout request against the file size.
    ///
    /// Exactly one of piece size or piece count is taken from the layout and
    /// the other is derived with ceiling division. An unknown size (0)
    /// requires an explicit layout.
    ///
    /// # Errors
    ///
    /// - `PieceFileError::InvalidGeometry` - If the layout yields zero-sized pieces,
    ///   no pieces, more than `u32::MAX` pieces, or does not cover `total_size`
    pub fn resolve(
        total_size: u64,
        layout: PieceLayout,
        default_piece_count: u32,
    ) -> Result<Self, PieceFileError> {
        let (piece_size, piece_count) = match layout {
            PieceLayout::Default => {
                require_known_size(total_size)?;
                let count = default_piece_count.max(1);
                (total_size.div_ceil(u64::from(count)), count)
            }
            PieceLayout::PieceCount(count) => {
                require_known_size(total_size)?;
                if count == 0 {
                    return Err(invalid("piece count must be non-zero"));
                }
                (total_size.div_ceil(u64::from(count)), count)
            }
            PieceLayout::PieceSize(size) => {
                require_known_size(total_size)?;
                if size == 0 {
                    return Err(invalid("piece size must be non-zero"));
                }
                let count = u32::try_from(total_size.div_ceil(size))
                    .map_err(|_| invalid("piece size yields more than u32::MAX pieces"))?;
                (size, count)
            }
            PieceLayout::Explicit {
                piece_size,
                piece_count,
            } => (piece_size, piece_count),
        };

        if piece_size == 0 || piece_count == 0 {
            return Err(invalid("piece size and piece count must be non-zero"));
        }
        let covered = piece_size.checked_mul(u64::from(piece_count));
        if covered.is_none_or(|covered| covered < total_size) {
            return Err(invalid("pieces do not cover the file size"));
        }

        Ok(Self {
            total_size,
            piece_size,
            piece_count,
        })
    }

    /// Byte offset where piece `index` starts.
    pub fn piece_offset(&self, index: PieceIndex) -> u64 {
        u64::from(index.as_u32()) * self.piece_size
    }

    /// Byte range piece `index` is expected to fill.
    ///
    /// The range is clamped to the file size when it is known, so the last
    /// piece may be shorter and pieces past the end may be empty.
    pub fn piece_range(&self, index: PieceIndex) -> Range<u64> {
        let start = self.piece_offset(index);
        let end = start + self.piece_size;
        if self.total_size == 0 {
            return start..end;
        }
        start.min(self.total_size)..end.min(self.total_size)
    }
}

fn require_known_size(total_size: u64) -> Result<(), PieceFileError> {
    if total_size == 0 {
        return Err(invalid(
            "file size is unknown, an explicit piece size and count are required",
        ));
    }
    Ok(())
}

fn invalid(reason: &str) -> PieceFileError {
    PieceFileError::InvalidGeometry {
        reason: reason.to_string(),
    }
}
