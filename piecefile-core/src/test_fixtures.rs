//! Test fixtures for piece file testing.
//!
//! Provides standardized temporary destinations and fast-polling options
//! for consistent testing across modules and crates.

use std::path::PathBuf;

use crate::config::PiecefileConfig;
use crate::piece_file::PieceFileOptions;

/// Creates a temporary directory and a destination path inside it.
///
/// The file itself is not created. Keep the returned `TempDir` alive for the
/// duration of the test.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created. This is acceptable
/// in test fixtures where failures indicate environment issues.
pub fn create_temp_piece_path() -> (tempfile::TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("assembled.bin");
    (temp_dir, path)
}

/// Options using the fast-polling testing configuration.
pub fn testing_options() -> PieceFileOptions {
    PieceFileOptions::new().with_config(PiecefileConfig::for_testing())
}

/// Deterministic content of `len` bytes for assembly tests.
pub fn patterned_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
