//! Integration tests for piece file assembly.
//!
//! These tests drive the public PieceFile API the way a segmented downloader
//! would: pieces arrive out of order from concurrent tasks, and callers wait
//! for the background detector to finalize and verify the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use piecefile_core::config::PiecefileConfig;
use piecefile_core::piece_file::{
    DigestAlgorithm, FinalizeError, PieceFile, PieceFileOptions, compute_file_digest,
};
use piecefile_core::{CompletionIndex, PieceIndex};
use tokio::time::timeout;

const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Temporary destination plus fast-polling options.
struct AssemblyFixture {
    temp_dir: tempfile::TempDir,
    path: PathBuf,
}

impl AssemblyFixture {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("download.bin");
        Self { temp_dir, path }
    }

    fn options(&self) -> PieceFileOptions {
        PieceFileOptions::new().with_config(PiecefileConfig::for_testing())
    }

    /// Digest of `content` as the hex string a caller would pass in.
    async fn digest_of(&self, content: &[u8], algorithm: DigestAlgorithm) -> String {
        let reference = self.temp_dir.path().join("reference.bin");
        tokio::fs::write(&reference, content).await.unwrap();
        hex::encode(compute_file_digest(&reference, algorithm, 1024).await.unwrap())
    }
}

async fn file_contents(path: &Path) -> Vec<u8> {
    tokio::fs::read(path).await.unwrap()
}

#[tokio::test]
async fn test_two_pieces_out_of_order() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(&fixture.path, 10, fixture.options().with_piece_size(5))
        .await
        .unwrap();
    assert_eq!(piece_file.geometry().piece_count, 2);

    piece_file
        .write_piece(PieceIndex::new(1), b"world")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();

    let outcome = timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
    assert!(piece_file.is_checked());
    assert_eq!(file_contents(&fixture.path).await, b"helloworld");
}

#[tokio::test]
async fn test_default_poll_interval_finishes_within_one_tick() {
    let fixture = AssemblyFixture::new();
    let mut config = PiecefileConfig::default();
    config.piece_file.wake_on_write = false;
    let piece_file = PieceFile::open(
        &fixture.path,
        10,
        PieceFileOptions::new()
            .with_config(config)
            .with_piece_size(5),
    )
    .await
    .unwrap();

    piece_file
        .write_piece(PieceIndex::new(1), b"world")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();

    let outcome = timeout(Duration::from_millis(2500), piece_file.wait_finish())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
    assert_eq!(file_contents(&fixture.path).await, b"helloworld");
}

#[tokio::test]
async fn test_matching_hash_verifies() {
    let fixture = AssemblyFixture::new();
    let expected = fixture.digest_of(b"helloworld", DigestAlgorithm::Sha1).await;
    let piece_file = PieceFile::open(
        &fixture.path,
        10,
        fixture
            .options()
            .with_piece_size(5)
            .with_expected_hash(expected),
    )
    .await
    .unwrap();

    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(1), b"world")
        .await
        .unwrap();

    let outcome = timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
    assert_eq!(piece_file.outcome(), Some(Ok(())));
}

#[tokio::test]
async fn test_md5_hex_digest_verifies() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(
        &fixture.path,
        10,
        fixture
            .options()
            .with_piece_size(5)
            .with_expected_hash("fc5e038d38a57032085441e7fe7010b0"),
    )
    .await
    .unwrap();

    piece_file
        .write_piece(PieceIndex::new(1), b"world")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();

    let outcome = timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
}

#[tokio::test]
async fn test_wrong_hash_still_reaches_checked() {
    let fixture = AssemblyFixture::new();
    let wrong = fixture.digest_of(b"something else", DigestAlgorithm::Sha256).await;
    let piece_file = PieceFile::open(
        &fixture.path,
        10,
        fixture
            .options()
            .with_piece_size(5)
            .with_expected_hash(wrong.clone()),
    )
    .await
    .unwrap();

    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(1), b"world")
        .await
        .unwrap();

    let outcome = timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap();
    match outcome {
        Err(FinalizeError::HashMismatch { expected, actual }) => {
            assert_eq!(expected, wrong);
            assert_eq!(
                actual,
                fixture.digest_of(b"helloworld", DigestAlgorithm::Sha256).await
            );
        }
        other => panic!("Expected HashMismatch, got {other:?}"),
    }
    assert!(piece_file.is_checked());
}

#[tokio::test]
async fn test_final_size_is_truncated() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(&fixture.path, 7, fixture.options().with_piece_size(5))
        .await
        .unwrap();

    // Both pieces are full-size, 10 bytes written for a 7 byte file
    piece_file
        .write_piece(PieceIndex::new(1), b"fghij")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"abcde")
        .await
        .unwrap();

    timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file_contents(&fixture.path).await, b"abcdefg");
}

#[tokio::test]
async fn test_short_file_is_extended() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(&fixture.path, 12, fixture.options().with_piece_size(8))
        .await
        .unwrap();

    piece_file
        .write_piece(PieceIndex::new(0), b"01234567")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(1), b"89")
        .await
        .unwrap();

    timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file_contents(&fixture.path).await, b"0123456789\0\0");
}

#[tokio::test]
async fn test_all_waiters_are_released() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(&fixture.path, 4, fixture.options().with_piece_count(2))
        .await
        .unwrap();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let piece_file = piece_file.clone();
            tokio::spawn(async move { piece_file.wait_finish().await })
        })
        .collect();

    piece_file
        .write_piece(PieceIndex::new(0), b"ab")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(1), b"cd")
        .await
        .unwrap();

    for waiter in waiters {
        let outcome = timeout(FINISH_TIMEOUT, waiter).await.unwrap().unwrap();
        assert_eq!(outcome, Ok(()));
    }

    // Late waiters return immediately
    assert_eq!(piece_file.wait_finish().await, Ok(()));
}

#[tokio::test]
async fn test_concurrent_writers_assemble_file() {
    let fixture = AssemblyFixture::new();
    let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let expected = fixture.digest_of(&content, DigestAlgorithm::Sha256).await;
    let piece_file = PieceFile::open(
        &fixture.path,
        content.len() as u64,
        fixture
            .options()
            .with_piece_size(64)
            .with_expected_hash(expected),
    )
    .await
    .unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let piece_file = piece_file.clone();
            let content = content.clone();
            tokio::spawn(async move {
                while let Some(index) = piece_file.claim_next_piece() {
                    let range = piece_file.geometry().piece_range(index);
                    let piece = &content[range.start as usize..range.end as usize];
                    piece_file.write_piece(index, piece).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for worker in workers {
        worker.await.unwrap();
    }

    let outcome = timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap();
    assert_eq!(outcome, Ok(()));
    assert_eq!(file_contents(&fixture.path).await, content);
}

#[tokio::test]
async fn test_resume_from_saved_index() {
    let fixture = AssemblyFixture::new();
    let index_path = fixture.temp_dir.path().join("download.pfci");

    {
        let piece_file = PieceFile::open(&fixture.path, 15, fixture.options().with_piece_size(5))
            .await
            .unwrap();
        piece_file
            .write_piece(PieceIndex::new(0), b"aaaaa")
            .await
            .unwrap();
        piece_file
            .write_piece(PieceIndex::new(2), b"ccccc")
            .await
            .unwrap();
        piece_file.save_index(&index_path).await.unwrap();
        assert!(!piece_file.is_checked());
    }

    let index = CompletionIndex::load(&tokio::fs::read(&index_path).await.unwrap()).unwrap();
    assert_eq!(index.completed_count(), 2);

    let piece_file = PieceFile::open(
        &fixture.path,
        15,
        fixture
            .options()
            .with_piece_size(5)
            .with_completion_index(index),
    )
    .await
    .unwrap();

    assert_eq!(piece_file.claim_next_piece(), Some(PieceIndex::new(1)));
    piece_file
        .write_piece(PieceIndex::new(1), b"bbbbb")
        .await
        .unwrap();

    timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file_contents(&fixture.path).await, b"aaaaabbbbbccccc");
}

#[tokio::test]
async fn test_unknown_size_keeps_written_length() {
    let fixture = AssemblyFixture::new();
    let piece_file = PieceFile::open(
        &fixture.path,
        0,
        fixture.options().with_explicit_layout(4, 2),
    )
    .await
    .unwrap();

    piece_file
        .write_piece(PieceIndex::new(1), b"efg")
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"abcd")
        .await
        .unwrap();

    timeout(FINISH_TIMEOUT, piece_file.wait_finish())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file_contents(&fixture.path).await, b"abcdefg");
}

#[tokio::test]
async fn test_existing_file_content_is_preserved_until_overwritten() {
    let fixture = AssemblyFixture::new();
    tokio::fs::write(&fixture.path, b"XXXXXXXXXX").await.unwrap();

    let piece_file = PieceFile::open(&fixture.path, 10, fixture.options().with_piece_size(5))
        .await
        .unwrap();
    piece_file
        .write_piece(PieceIndex::new(0), b"hello")
        .await
        .unwrap();

    assert_eq!(file_contents(&fixture.path).await, b"helloXXXXX");
    assert!(!piece_file.is_checked());
}

#[tokio::test]
async fn test_invalid_digest_fails_open() {
    let fixture = AssemblyFixture::new();
    let result = PieceFile::open(
        &fixture.path,
        10,
        fixture.options().with_expected_hash("not-hex"),
    )
    .await;

    assert!(result.is_err());
}
