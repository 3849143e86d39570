//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Subcommand;
use futures::future::try_join_all;
use piecefile_core::config::PiecefileConfig;
use piecefile_core::piece_file::{
    DigestAlgorithm, PieceFile, PieceFileOptions, compute_file_digest,
};
use piecefile_core::{CompletionIndex, PieceIndex};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Missing pieces listed by `status` before eliding the rest
const MISSING_PREVIEW_LEN: usize = 32;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Assemble OUTPUT from SOURCE piece by piece, out of order
    Assemble(AssembleArgs),
    /// Show progress recorded in a saved completion index
    Status {
        /// Path to the saved completion index
        index: PathBuf,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the hex digest of a file, usable with `assemble --hash`
    Digest {
        /// File to hash
        file: PathBuf,
        /// Digest algorithm
        #[arg(short, long, value_enum, default_value_t = DigestAlgorithm::Sha256)]
        algorithm: DigestAlgorithm,
    },
}

/// Arguments for `assemble`
#[derive(clap::Args)]
pub struct AssembleArgs {
    /// File the pieces are read from
    pub source: PathBuf,
    /// File the pieces are written to
    pub output: PathBuf,
    /// Piece size in bytes
    #[arg(long, conflicts_with = "piece_count")]
    pub piece_size: Option<u64>,
    /// Number of pieces
    #[arg(long)]
    pub piece_count: Option<u32>,
    /// Expected hex digest of the assembled file (md5, sha1 or sha256)
    #[arg(long)]
    pub hash: Option<String>,
    /// Concurrent piece writers
    #[arg(short, long, default_value = "4")]
    pub workers: usize,
    /// Completion index to resume from and save progress to
    #[arg(long)]
    pub index: Option<PathBuf>,
    /// Deliver pieces in random order
    #[arg(long)]
    pub shuffle: bool,
}

/// Progress summary printed by `status`
#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub capacity: u32,
    pub completed: u32,
    pub complete: bool,
    pub missing: Vec<u32>,
    pub missing_total: usize,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands, config: PiecefileConfig) -> anyhow::Result<()> {
    match command {
        Commands::Assemble(args) => assemble(args, config).await,
        Commands::Status { index, json } => show_status(&index, json).await,
        Commands::Digest { file, algorithm } => print_digest(&file, algorithm, &config).await,
    }
}

/// Simulate a segmented transfer from SOURCE into OUTPUT
///
/// # Errors
/// - Source cannot be read or output cannot be written
/// - Saved index is corrupt or does not match the piece layout
/// - Assembled file fails verification
pub async fn assemble(args: AssembleArgs, config: PiecefileConfig) -> anyhow::Result<()> {
    let total_size = fs::metadata(&args.source)
        .await
        .with_context(|| format!("cannot stat source {}", args.source.display()))?
        .len();

    let mut options = PieceFileOptions::new().with_config(config);
    if let Some(piece_size) = args.piece_size {
        options = options.with_piece_size(piece_size);
    }
    if let Some(piece_count) = args.piece_count {
        options = options.with_piece_count(piece_count);
    }
    if let Some(hash) = &args.hash {
        options = options.with_expected_hash(hash.as_str());
    }
    if let Some(index_path) = &args.index {
        if let Some(index) = load_saved_index(index_path).await? {
            tracing::info!(
                "Resuming with {}/{} pieces from {}",
                index.completed_count(),
                index.capacity(),
                index_path.display()
            );
            options = options.with_completion_index(index);
        }
    }

    let piece_file = PieceFile::open(&args.output, total_size, options).await?;
    let geometry = piece_file.geometry();
    println!(
        "Assembling {} ({} bytes) in {} pieces of {} bytes",
        args.output.display(),
        total_size,
        geometry.piece_count,
        geometry.piece_size
    );

    let mut pending = Vec::new();
    while let Some(index) = piece_file.claim_next_piece() {
        pending.push(index);
    }
    if args.shuffle {
        pending.shuffle(&mut rand::rng());
    }

    let workers = args.workers.max(1);
    let mut assignments = vec![Vec::new(); workers];
    for (position, index) in pending.into_iter().enumerate() {
        assignments[position % workers].push(index);
    }

    let delivered = try_join_all(
        assignments
            .into_iter()
            .map(|pieces| deliver_pieces(&piece_file, &args.source, pieces)),
    )
    .await;

    if let Some(index_path) = &args.index {
        piece_file.save_index(index_path).await?;
    }
    delivered?;

    let outcome = piece_file.wait_finish().await;
    if let Some(index_path) = &args.index {
        piece_file.save_index(index_path).await?;
    }

    match outcome {
        Ok(()) => {
            println!("Assembled {}", args.output.display());
            Ok(())
        }
        Err(e) => bail!("{} assembled but not verified: {e}", args.output.display()),
    }
}

/// Reads each assigned piece from the source and writes it to the piece file.
///
/// A piece that fails is released so a later run can claim it again.
async fn deliver_pieces(
    piece_file: &PieceFile,
    source: &Path,
    pieces: Vec<PieceIndex>,
) -> anyhow::Result<()> {
    if pieces.is_empty() {
        return Ok(());
    }
    let mut source_file = File::open(source)
        .await
        .with_context(|| format!("cannot open source {}", source.display()))?;

    for index in pieces {
        if let Err(e) = deliver_piece(piece_file, &mut source_file, index).await {
            piece_file.release_piece(index);
            return Err(e.context(format!("piece {index} failed")));
        }
    }
    Ok(())
}

async fn deliver_piece(
    piece_file: &PieceFile,
    source_file: &mut File,
    index: PieceIndex,
) -> anyhow::Result<()> {
    let range = piece_file.geometry().piece_range(index);
    let mut piece = vec![0u8; (range.end - range.start) as usize];
    source_file
        .seek(std::io::SeekFrom::Start(range.start))
        .await?;
    source_file.read_exact(&mut piece).await?;

    piece_file.write_piece(index, &piece).await?;
    tracing::debug!("Delivered piece {index}");
    Ok(())
}

/// Show the progress recorded in a saved index
///
/// # Errors
/// - Index file cannot be read or is corrupt
pub async fn show_status(index_path: &Path, json: bool) -> anyhow::Result<()> {
    let bytes = fs::read(index_path)
        .await
        .with_context(|| format!("cannot read index {}", index_path.display()))?;
    let status = index_status(&CompletionIndex::load(&bytes)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Completion index: {}", index_path.display());
    println!("{:-<60}", "");
    println!("Pieces complete: {}/{}", status.completed, status.capacity);
    if status.complete {
        println!("All pieces present.");
    } else {
        let preview: Vec<String> = status.missing.iter().map(u32::to_string).collect();
        let elided = status.missing_total - status.missing.len();
        if elided > 0 {
            println!("Missing: {} ... and {elided} more", preview.join(", "));
        } else {
            println!("Missing: {}", preview.join(", "));
        }
    }
    Ok(())
}

/// Summarize an index for display.
pub fn index_status(index: &CompletionIndex) -> IndexStatus {
    let missing = index.missing_pieces();
    IndexStatus {
        capacity: index.capacity(),
        completed: index.completed_count(),
        complete: index.check_complete(),
        missing_total: missing.len(),
        missing: missing
            .into_iter()
            .take(MISSING_PREVIEW_LEN)
            .map(PieceIndex::as_u32)
            .collect(),
    }
}

/// Print the digest of a file
///
/// # Errors
/// - File cannot be read
pub async fn print_digest(
    file: &Path,
    algorithm: DigestAlgorithm,
    config: &PiecefileConfig,
) -> anyhow::Result<()> {
    let digest = compute_file_digest(file, algorithm, config.storage.hash_buffer_size)
        .await
        .with_context(|| format!("cannot hash {}", file.display()))?;
    println!("{}  {}", hex::encode(digest), file.display());
    Ok(())
}

/// Returns the saved index at `path`, or `None` if nothing was saved yet.
async fn load_saved_index(path: &Path) -> anyhow::Result<Option<CompletionIndex>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(CompletionIndex::load(&bytes).with_context(|| {
            format!("cannot resume from {}", path.display())
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot read index {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use piecefile_core::test_fixtures::{create_temp_piece_path, patterned_content};

    use super::*;

    fn assemble_args(source: PathBuf, output: PathBuf) -> AssembleArgs {
        AssembleArgs {
            source,
            output,
            piece_size: Some(100),
            piece_count: None,
            hash: None,
            workers: 3,
            index: None,
            shuffle: true,
        }
    }

    #[tokio::test]
    async fn test_assemble_shuffled_with_hash() {
        let (temp_dir, output) = create_temp_piece_path();
        let source = temp_dir.path().join("source.bin");
        let content = patterned_content(1234);
        fs::write(&source, &content).await.unwrap();
        let hash = hex::encode(
            compute_file_digest(&source, DigestAlgorithm::Sha256, 4096)
                .await
                .unwrap(),
        );

        let mut args = assemble_args(source, output.clone());
        args.hash = Some(hash);
        args.index = Some(temp_dir.path().join("progress.pfci"));
        assemble(args, PiecefileConfig::for_testing()).await.unwrap();

        assert_eq!(fs::read(&output).await.unwrap(), content);

        let saved = fs::read(temp_dir.path().join("progress.pfci")).await.unwrap();
        let status = index_status(&CompletionIndex::load(&saved).unwrap());
        assert!(status.complete);
        assert_eq!(status.capacity, 13);
        assert_eq!(status.missing_total, 0);
    }

    #[tokio::test]
    async fn test_assemble_reports_hash_mismatch() {
        let (temp_dir, output) = create_temp_piece_path();
        let source = temp_dir.path().join("source.bin");
        fs::write(&source, patterned_content(300)).await.unwrap();

        let mut args = assemble_args(source, output.clone());
        args.hash = Some("00".repeat(20));
        let result = assemble(args, PiecefileConfig::for_testing()).await;

        assert!(result.is_err());
        assert_eq!(fs::metadata(&output).await.unwrap().len(), 300);
    }

    #[tokio::test]
    async fn test_assemble_accepts_md5_hash() {
        let (temp_dir, output) = create_temp_piece_path();
        let source = temp_dir.path().join("source.bin");
        fs::write(&source, patterned_content(250)).await.unwrap();
        let hash = hex::encode(
            compute_file_digest(&source, DigestAlgorithm::Md5, 64)
                .await
                .unwrap(),
        );
        assert_eq!(hash.len(), 32);

        let mut args = assemble_args(source, output);
        args.hash = Some(hash);
        assemble(args, PiecefileConfig::for_testing()).await.unwrap();
    }

    #[tokio::test]
    async fn test_assemble_missing_source() {
        let (temp_dir, output) = create_temp_piece_path();
        let args = assemble_args(temp_dir.path().join("absent.bin"), output);
        assert!(assemble(args, PiecefileConfig::for_testing()).await.is_err());
    }

    #[test]
    fn test_index_status_previews_missing_pieces() {
        let index = CompletionIndex::new(100);
        index.add(PieceIndex::new(0));
        index.add(PieceIndex::new(2));

        let status = index_status(&index);
        assert_eq!(status.completed, 2);
        assert!(!status.complete);
        assert_eq!(status.missing_total, 98);
        assert_eq!(status.missing.len(), MISSING_PREVIEW_LEN);
        assert_eq!(&status.missing[..3], &[1, 3, 4]);
    }

    #[tokio::test]
    async fn test_missing_index_means_fresh_start() {
        let (temp_dir, _output) = create_temp_piece_path();
        let loaded = load_saved_index(&temp_dir.path().join("none.pfci"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_rejected() {
        let (temp_dir, _output) = create_temp_piece_path();
        let path = temp_dir.path().join("bad.pfci");
        fs::write(&path, b"garbage").await.unwrap();
        assert!(load_saved_index(&path).await.is_err());
    }
}
