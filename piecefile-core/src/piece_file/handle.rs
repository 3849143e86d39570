//! Public `PieceFile` handle.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Notify, RwLock, watch};

use super::{
    ExpectedDigest, FinalizeError, FinishOutcome, PieceFileError, PieceFileOptions, PieceGeometry,
    detector,
};
use crate::completion::{CompletionError, CompletionIndex, PieceIndex};
use crate::config::PiecefileConfig;

/// File assembled from index-addressed pieces.
///
/// Cloning yields another handle to the same file; writes from any number of
/// tasks are serialized internally. The background detector finalizes the
/// file once every piece has been written and releases all `wait_finish`
/// callers with the same outcome.
#[derive(Clone)]
pub struct PieceFile {
    shared: Arc<Shared>,
    outcome: watch::Receiver<Option<FinishOutcome>>,
}

/// State shared between handles and the detector task.
///
/// `index` is only marked while the `state` write guard is held; take
/// `state` first and never await while touching `index`.
pub(super) struct Shared {
    pub(super) path: PathBuf,
    pub(super) geometry: PieceGeometry,
    pub(super) expected: Option<ExpectedDigest>,
    pub(super) index: CompletionIndex,
    pub(super) state: RwLock<FileState>,
    pub(super) write_notify: Notify,
    pub(super) config: PiecefileConfig,
}

/// Lifecycle of the file resource.
///
/// `Open -> Finalizing -> Checked`; nothing leaves `Checked`.
pub(super) enum FileState {
    Open(File),
    Finalizing,
    Checked,
}

/// Snapshot of assembly progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PieceFileStats {
    pub completed_pieces: u32,
    pub total_pieces: u32,
    pub piece_size: u64,
    pub total_size: u64,
    pub checked: bool,
}

impl PieceFile {
    /// Opens or creates the destination file and starts completion detection.
    ///
    /// Returns immediately; the detector runs on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - `PieceFileError::InvalidGeometry` - If the layout cannot describe `total_size`
    /// - `PieceFileError::InvalidDigest` - If the expected hash is malformed
    /// - `PieceFileError::IndexMismatch` - If a resumed index has the wrong capacity
    /// - `PieceFileError::Io` - If the file cannot be opened or created
    pub async fn open(
        path: impl AsRef<Path>,
        total_size: u64,
        options: PieceFileOptions,
    ) -> Result<Self, PieceFileError> {
        let PieceFileOptions {
            layout,
            expected_hash,
            completion_index,
            config,
        } = options;

        let geometry =
            PieceGeometry::resolve(total_size, layout, config.piece_file.default_piece_count)?;
        let expected = ExpectedDigest::parse(&expected_hash)?;

        let index = match completion_index {
            Some(index) if index.capacity() != geometry.piece_count => {
                return Err(PieceFileError::IndexMismatch {
                    expected: geometry.piece_count,
                    actual: index.capacity(),
                });
            }
            Some(index) => index,
            None => CompletionIndex::new(geometry.piece_count),
        };

        let path = path.as_ref().to_path_buf();
        let mut open_options = OpenOptions::new();
        open_options.read(true).write(true).create(true);
        #[cfg(unix)]
        open_options.mode(config.storage.file_mode);
        let file = open_options.open(&path).await?;

        tracing::debug!(
            "Opened piece file {}: {} bytes, {} pieces of {} bytes, {} already complete",
            path.display(),
            geometry.total_size,
            geometry.piece_count,
            geometry.piece_size,
            index.completed_count()
        );

        let shared = Arc::new(Shared {
            path,
            geometry,
            expected,
            index,
            state: RwLock::new(FileState::Open(file)),
            write_notify: Notify::new(),
            config,
        });

        let (outcome_sender, outcome) = watch::channel(None);
        tokio::spawn(detector::run_completion_detector(
            Arc::clone(&shared),
            outcome_sender,
        ));

        Ok(Self { shared, outcome })
    }

    /// Writes piece `index` at `index * piece_size` and marks it complete.
    ///
    /// Already-complete pieces and writes after finalization began succeed
    /// without touching the file. A failed write leaves the piece unmarked so
    /// the caller can retry.
    ///
    /// # Errors
    ///
    /// - `PieceFileError::Completion` - If `index` is outside the piece range
    /// - `PieceFileError::PieceTooLarge` - If `data` is longer than a piece
    /// - `PieceFileError::Io` - If seeking, writing, or flushing fails
    pub async fn write_piece(&self, index: PieceIndex, data: &[u8]) -> Result<(), PieceFileError> {
        let mut state = self.shared.state.write().await;
        let FileState::Open(file) = &mut *state else {
            tracing::trace!("Dropping piece {index}: file already finalized");
            return Ok(());
        };

        if self.shared.index.contains(index)? {
            tracing::trace!("Piece {index} already written");
            return Ok(());
        }

        let piece_size = self.shared.geometry.piece_size;
        if data.len() as u64 > piece_size {
            return Err(PieceFileError::PieceTooLarge {
                index,
                len: data.len(),
                piece_size,
            });
        }

        let offset = self.shared.geometry.piece_offset(index);
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        self.shared.index.add(index);
        drop(state);

        tracing::debug!(
            "Wrote piece {index} ({} bytes at offset {offset})",
            data.len()
        );
        if self.shared.config.piece_file.wake_on_write {
            self.shared.write_notify.notify_one();
        }
        Ok(())
    }

    /// Waits until the file is finalized and returns the outcome.
    ///
    /// Any number of tasks may wait concurrently; all observe the same
    /// outcome. Returns immediately once finalized.
    pub async fn wait_finish(&self) -> FinishOutcome {
        let mut outcome = self.outcome.clone();
        let published = match outcome.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        published.unwrap_or(Err(FinalizeError::DetectorStopped))
    }

    /// Returns whether finalization has completed, without waiting.
    pub fn is_checked(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Finalization outcome, or `None` while still assembling.
    pub fn outcome(&self) -> Option<FinishOutcome> {
        self.outcome.borrow().clone()
    }

    /// Returns whether piece `index` has been written.
    ///
    /// # Errors
    ///
    /// - `CompletionError::OutOfBounds` - If `index` is outside the piece range
    pub fn contains(&self, index: PieceIndex) -> Result<bool, CompletionError> {
        self.shared.index.contains(index)
    }

    /// Claims the lowest piece nobody has written or claimed yet.
    ///
    /// Advisory only: callers that fail to deliver the piece should hand it
    /// back with `release_piece`.
    pub fn claim_next_piece(&self) -> Option<PieceIndex> {
        self.shared.index.find_first_incomplete()
    }

    /// Returns a claimed but undelivered piece to the pool.
    pub fn release_piece(&self, index: PieceIndex) {
        self.shared.index.remove(index);
    }

    /// Encoded completion index, suitable for `CompletionIndex::load`.
    pub fn index_snapshot(&self) -> Vec<u8> {
        self.shared.index.to_bytes()
    }

    /// Persists the completion index to `path`.
    ///
    /// Writes to a sibling scratch file first and renames it into place, so
    /// a crash never leaves a half-written index behind.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - If writing or renaming fails
    pub async fn save_index(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let mut scratch = path.as_os_str().to_owned();
        scratch.push(self.shared.config.storage.temp_file_suffix);
        let scratch = PathBuf::from(scratch);

        tokio::fs::write(&scratch, self.index_snapshot()).await?;
        tokio::fs::rename(&scratch, path).await?;

        tracing::trace!("Saved completion index to {}", path.display());
        Ok(())
    }

    /// Progress snapshot.
    pub fn stats(&self) -> PieceFileStats {
        let geometry = self.shared.geometry;
        PieceFileStats {
            completed_pieces: self.shared.index.completed_count(),
            total_pieces: geometry.piece_count,
            piece_size: geometry.piece_size,
            total_size: geometry.total_size,
            checked: self.is_checked(),
        }
    }

    /// Resolved piece layout.
    pub fn geometry(&self) -> PieceGeometry {
        self.shared.geometry
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}
