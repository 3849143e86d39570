//! Persisted form of the completion index.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic "PFCI" | version u8 | capacity u32 | bitmap ceil(capacity / 8) bytes
//! ```
//!
//! The bitmap uses BitTorrent bitfield order (piece 0 is the high bit of the
//! first byte) and its padding bits must be zero. Only completed pieces are
//! stored; in-flight claims are runtime state and are not persisted.

use std::io::{self, Read, Write};

use bitvec::prelude::*;

use super::{CompletionError, CompletionIndex};

const MAGIC: &[u8; 4] = b"PFCI";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

impl CompletionIndex {
    /// Decodes an index previously produced by `to_bytes` or `write_to`.
    ///
    /// # Errors
    ///
    /// - `CompletionError::CorruptIndex` - If the data is truncated, has a bad
    ///   header, trailing bytes, or non-zero padding bits
    pub fn load(bytes: &[u8]) -> Result<Self, CompletionError> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupt(format!(
                "expected at least {HEADER_LEN} header bytes, got {}",
                bytes.len()
            )));
        }
        let (header, bitmap) = bytes.split_at(HEADER_LEN);
        let capacity = parse_header(header)?;

        let expected_len = bitmap_len(capacity);
        if bitmap.len() != expected_len {
            return Err(corrupt(format!(
                "bitmap for {capacity} pieces needs {expected_len} bytes, got {}",
                bitmap.len()
            )));
        }

        let mut bits = BitVec::<u8, Msb0>::from_vec(bitmap.to_vec());
        if bits[capacity as usize..].any() {
            return Err(corrupt("padding bits beyond capacity are set".to_string()));
        }
        bits.truncate(capacity as usize);

        Ok(Self::from_bits(bits))
    }

    /// Reads an encoded index from a byte stream.
    ///
    /// # Errors
    ///
    /// - `CompletionError::CorruptIndex` - If the stream ends early or the data is malformed
    /// - `CompletionError::Io` - If reading the stream fails
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, CompletionError> {
        let mut header = [0u8; HEADER_LEN];
        read_exact_or_corrupt(&mut reader, &mut header)?;
        let capacity = parse_header(&header)?;

        let mut encoded = Vec::with_capacity(HEADER_LEN + bitmap_len(capacity));
        encoded.extend_from_slice(&header);
        reader.read_to_end(&mut encoded)?;

        Self::load(&encoded)
    }

    /// Encodes the completed set.
    pub fn to_bytes(&self) -> Vec<u8> {
        let bits = self.completed_bits();
        let capacity = bits.len() as u32;

        let mut encoded = Vec::with_capacity(HEADER_LEN + bitmap_len(capacity));
        encoded.extend_from_slice(MAGIC);
        encoded.push(FORMAT_VERSION);
        encoded.extend_from_slice(&capacity.to_le_bytes());
        encoded.extend_from_slice(&bits.into_vec());
        encoded
    }

    /// Writes the encoded completed set to a byte stream.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - If the writer fails
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }
}

fn parse_header(header: &[u8]) -> Result<u32, CompletionError> {
    if &header[..MAGIC.len()] != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let version = header[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let mut capacity = [0u8; 4];
    capacity.copy_from_slice(&header[MAGIC.len() + 1..HEADER_LEN]);
    Ok(u32::from_le_bytes(capacity))
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CompletionError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => corrupt("truncated header".to_string()),
        _ => CompletionError::Io(e),
    })
}

fn bitmap_len(capacity: u32) -> usize {
    (capacity as usize).div_ceil(8)
}

fn corrupt(reason: String) -> CompletionError {
    CompletionError::CorruptIndex { reason }
}
