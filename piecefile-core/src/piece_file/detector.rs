//! Background completion detector.
//!
//! One task per `PieceFile`. It wakes on a fixed interval, and after every
//! successful piece write when `wake_on_write` is enabled, checks the
//! completion index and runs the finalize sequence exactly once.

use std::sync::Arc;

use tokio::fs::File;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::handle::{FileState, Shared};
use super::{FinalizeError, FinishOutcome, compute_file_digest};

/// Polls until every piece is present, finalizes, publishes the outcome.
///
/// A file whose pieces are all written is finalized even when every
/// `PieceFile` handle is gone. Exits early only if the handles were dropped
/// while pieces were still missing.
pub(super) async fn run_completion_detector(
    shared: Arc<Shared>,
    outcome_sender: watch::Sender<Option<FinishOutcome>>,
) {
    let piece_config = &shared.config.piece_file;
    let mut ticker = tokio::time::interval(piece_config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        "Completion detector started for {} (poll every {:?})",
        shared.path.display(),
        piece_config.poll_interval
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.write_notify.notified(), if piece_config.wake_on_write => {}
        }

        if shared.index.check_complete() {
            break;
        }

        // Without a handle no further piece can arrive.
        if outcome_sender.is_closed() {
            tracing::debug!(
                "Completion detector for {} abandoned with {}/{} pieces",
                shared.path.display(),
                shared.index.last_checked_count(),
                shared.geometry.piece_count
            );
            return;
        }
        tracing::trace!(
            "{}: {}/{} pieces complete",
            shared.path.display(),
            shared.index.last_checked_count(),
            shared.geometry.piece_count
        );
    }

    finalize(&shared, &outcome_sender).await;
}

/// Moves the file through `Finalizing` to `Checked` and broadcasts the outcome.
///
/// The state lock is held only to take the file handle and to commit the
/// terminal state; resizing and hashing run unlocked. Writers observe
/// `Finalizing` and drop their data, and every piece is already complete.
async fn finalize(shared: &Shared, outcome_sender: &watch::Sender<Option<FinishOutcome>>) {
    let file = {
        let mut state = shared.state.write().await;
        match std::mem::replace(&mut *state, FileState::Finalizing) {
            FileState::Open(file) => file,
            finished => {
                *state = finished;
                return;
            }
        }
    };

    let outcome = normalize_and_verify(shared, &file).await;
    match &outcome {
        Ok(()) => tracing::info!("{} complete and verified", shared.path.display()),
        Err(e) => tracing::warn!("{} finished with error: {e}", shared.path.display()),
    }

    let mut state = shared.state.write().await;
    *state = FileState::Checked;
    drop(file);
    outcome_sender.send_replace(Some(outcome));
}

async fn normalize_and_verify(shared: &Shared, file: &File) -> FinishOutcome {
    let total_size = shared.geometry.total_size;
    if total_size != 0 {
        let metadata = file
            .metadata()
            .await
            .map_err(|e| FinalizeError::io("stat", e))?;
        if metadata.len() != total_size {
            tracing::debug!(
                "Resizing {} from {} to {} bytes",
                shared.path.display(),
                metadata.len(),
                total_size
            );
            file.set_len(total_size)
                .await
                .map_err(|e| FinalizeError::io("truncate", e))?;
        }
    }
    file.sync_all()
        .await
        .map_err(|e| FinalizeError::io("sync", e))?;

    let Some(expected) = &shared.expected else {
        return Ok(());
    };

    let actual = compute_file_digest(
        &shared.path,
        expected.algorithm(),
        shared.config.storage.hash_buffer_size,
    )
    .await
    .map_err(|e| FinalizeError::io("hash read", e))?;

    if actual.as_slice() != expected.as_bytes() {
        return Err(FinalizeError::HashMismatch {
            expected: expected.to_hex(),
            actual: hex::encode(actual),
        });
    }
    tracing::debug!("{} digest matches {}", shared.path.display(), expected.to_hex());
    Ok(())
}
