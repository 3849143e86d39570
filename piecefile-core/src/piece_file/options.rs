//! Construction options for `PieceFile`.

use crate::completion::CompletionIndex;
use crate::config::PiecefileConfig;

/// How the file is split into pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PieceLayout {
    /// Split into the configured default piece count
    #[default]
    Default,
    /// Fixed piece size, count derived from the file size
    PieceSize(u64),
    /// Fixed piece count, size derived from the file size
    PieceCount(u32),
    /// Both given; required when the file size is unknown
    Explicit { piece_size: u64, piece_count: u32 },
}

/// Options recognized by `PieceFile::open`.
///
/// Layout setters replace each other, the last one applied wins.
///
/// # Examples
/// ```
/// use piecefile_core::piece_file::{PieceFileOptions, PieceLayout};
///
/// let options = PieceFileOptions::new()
///     .with_piece_count(4)
///     .with_piece_size(1024);
/// assert_eq!(options.layout(), PieceLayout::PieceSize(1024));
/// ```
#[derive(Debug, Default)]
pub struct PieceFileOptions {
    pub(crate) layout: PieceLayout,
    pub(crate) expected_hash: String,
    pub(crate) completion_index: Option<CompletionIndex>,
    pub(crate) config: PiecefileConfig,
}

impl PieceFileOptions {
    /// Creates options with the default layout and no verification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses fixed-size pieces; the count is derived from the file size.
    pub fn with_piece_size(mut self, piece_size: u64) -> Self {
        self.layout = PieceLayout::PieceSize(piece_size);
        self
    }

    /// Uses a fixed number of pieces; the size is derived from the file size.
    pub fn with_piece_count(mut self, piece_count: u32) -> Self {
        self.layout = PieceLayout::PieceCount(piece_count);
        self
    }

    /// Sets both piece size and count, for files of unknown size.
    pub fn with_explicit_layout(mut self, piece_size: u64, piece_count: u32) -> Self {
        self.layout = PieceLayout::Explicit {
            piece_size,
            piece_count,
        };
        self
    }

    /// Sets the hex digest the finished file must match. Empty disables verification.
    pub fn with_expected_hash(mut self, expected_hash: impl Into<String>) -> Self {
        self.expected_hash = expected_hash.into();
        self
    }

    /// Resumes from a previously persisted completion index.
    pub fn with_completion_index(mut self, index: CompletionIndex) -> Self {
        self.completion_index = Some(index);
        self
    }

    /// Overrides the configuration used for defaults, polling, and I/O.
    pub fn with_config(mut self, config: PiecefileConfig) -> Self {
        self.config = config;
        self
    }

    /// Currently selected layout.
    pub fn layout(&self) -> PieceLayout {
        self.layout
    }

    /// Currently selected expected digest.
    pub fn expected_hash(&self) -> &str {
        &self.expected_hash
    }
}
