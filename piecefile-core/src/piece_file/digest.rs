//! Whole-file digest verification.

use std::fmt;
use std::path::Path;

use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::PieceFileError;

/// Supported whole-file digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DigestAlgorithm {
    /// MD5, 16-byte digest
    Md5,
    /// SHA-1, 20-byte digest
    Sha1,
    /// SHA-256, 32-byte digest
    Sha256,
}

impl DigestAlgorithm {
    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
        }
    }

    fn from_output_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(DigestAlgorithm::Md5),
            20 => Some(DigestAlgorithm::Sha1),
            32 => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    fn hasher(self) -> FileHasher {
        match self {
            DigestAlgorithm::Md5 => FileHasher::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => FileHasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => FileHasher::Sha256(Sha256::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Sha1 => write!(f, "sha1"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Digest the finished file must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl ExpectedDigest {
    /// Parses a hex digest, inferring the algorithm from its length.
    ///
    /// Returns `Ok(None)` for an empty string, which disables verification.
    ///
    /// # Errors
    ///
    /// - `PieceFileError::InvalidDigest` - If the string is not hex or has an unsupported length
    pub fn parse(hex_digest: &str) -> Result<Option<Self>, PieceFileError> {
        let trimmed = hex_digest.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let bytes = hex::decode(trimmed).map_err(|e| PieceFileError::InvalidDigest {
            reason: format!("not a hex string: {e}"),
        })?;
        let algorithm = DigestAlgorithm::from_output_len(bytes.len()).ok_or_else(|| {
            PieceFileError::InvalidDigest {
                reason: format!(
                    "{} byte digest matches no supported algorithm (md5, sha1, sha256)",
                    bytes.len()
                ),
            }
        })?;

        Ok(Some(Self { algorithm, bytes }))
    }

    /// Algorithm implied by the digest length.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

enum FileHasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl FileHasher {
    fn update(&mut self, chunk: &[u8]) {
        match self {
            FileHasher::Md5(hasher) => hasher.update(chunk),
            FileHasher::Sha1(hasher) => hasher.update(chunk),
            FileHasher::Sha256(hasher) => hasher.update(chunk),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            FileHasher::Md5(hasher) => hasher.finalize().to_vec(),
            FileHasher::Sha1(hasher) => hasher.finalize().to_vec(),
            FileHasher::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }
}

/// Hashes a file by streaming it in `buffer_size` chunks.
///
/// # Errors
///
/// - `std::io::Error` - If the file cannot be opened or read
pub async fn compute_file_digest(
    path: &Path,
    algorithm: DigestAlgorithm,
    buffer_size: usize,
) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize())
}
