//! Concurrency-safe completion index.

use bitvec::prelude::*;
use parking_lot::RwLock;

use super::{CompletionError, PieceIndex};

/// Bitmap of completed pieces with an in-flight claim set.
///
/// All mutations and the authoritative completion predicate serialize
/// through one `RwLock`; membership queries take the shared side so they
/// never observe a half-applied `add`. Methods take `&self`, the index is
/// meant to be shared between writer tasks and the completion detector.
#[derive(Debug)]
pub struct CompletionIndex {
    state: RwLock<IndexState>,
}

#[derive(Debug, Clone)]
struct IndexState {
    capacity: u32,
    /// Pieces durably written
    completed: BitVec<u8, Msb0>,
    /// Pieces handed out by `find_first_incomplete`, always a superset of `completed`
    claimed: BitVec<u8, Msb0>,
    /// Cardinality of `completed` as of the last `check_complete`
    good: u32,
}

impl CompletionIndex {
    /// Creates an empty index tracking `capacity` pieces.
    pub fn new(capacity: u32) -> Self {
        Self::from_bits(bitvec![u8, Msb0; 0; capacity as usize])
    }

    /// Builds an index from an already populated completion bitmap.
    ///
    /// Nothing is in flight afterwards; completed pieces are never handed
    /// out again.
    pub(crate) fn from_bits(completed: BitVec<u8, Msb0>) -> Self {
        let capacity = completed.len() as u32;
        let good = completed.count_ones() as u32;
        Self {
            state: RwLock::new(IndexState {
                capacity,
                claimed: completed.clone(),
                completed,
                good,
            }),
        }
    }

    /// Number of pieces tracked.
    pub fn capacity(&self) -> u32 {
        self.state.read().capacity
    }

    /// Returns whether piece `index` has been marked complete.
    ///
    /// # Errors
    ///
    /// - `CompletionError::OutOfBounds` - If `index >= capacity`
    pub fn contains(&self, index: PieceIndex) -> Result<bool, CompletionError> {
        let state = self.state.read();
        state.check_bounds(index)?;
        Ok(state.completed[index.as_usize()])
    }

    /// Marks piece `index` complete. Idempotent; out-of-bounds is ignored.
    pub fn add(&self, index: PieceIndex) {
        let mut state = self.state.write();
        if state.check_bounds(index).is_err() {
            return;
        }
        let slot = index.as_usize();
        state.completed.set(slot, true);
        state.claimed.set(slot, true);
    }

    /// Releases an in-flight claim so the piece can be handed out again.
    ///
    /// Completed pieces stay claimed. Out-of-bounds is ignored.
    pub fn remove(&self, index: PieceIndex) {
        let mut state = self.state.write();
        if state.check_bounds(index).is_err() {
            return;
        }
        let slot = index.as_usize();
        if !state.completed[slot] {
            state.claimed.set(slot, false);
        }
    }

    /// Recomputes the completed cardinality and reports whether every piece
    /// is present.
    pub fn check_complete(&self) -> bool {
        let mut state = self.state.write();
        state.good = state.completed.count_ones() as u32;
        state.good == state.capacity
    }

    /// Claims the lowest piece that is neither complete nor in flight.
    ///
    /// Returns `None` when every piece is complete or claimed. A returned
    /// piece is not handed out again until `remove` releases it.
    pub fn find_first_incomplete(&self) -> Option<PieceIndex> {
        let mut state = self.state.write();
        let slot = state.claimed.first_zero()?;
        state.claimed.set(slot, true);
        Some(PieceIndex::new(slot as u32))
    }

    /// Number of completed pieces right now.
    pub fn completed_count(&self) -> u32 {
        self.state.read().completed.count_ones() as u32
    }

    /// Completed count observed by the last `check_complete` call.
    pub fn last_checked_count(&self) -> u32 {
        self.state.read().good
    }

    /// Returns true when no piece has been completed yet.
    pub fn is_empty(&self) -> bool {
        self.state.read().completed.not_any()
    }

    /// Snapshot of absent pieces in ascending order.
    pub fn missing_pieces(&self) -> Vec<PieceIndex> {
        self.state
            .read()
            .completed
            .iter_zeros()
            .map(|slot| PieceIndex::new(slot as u32))
            .collect()
    }

    /// Copy of the completion bitmap with dead tail bits cleared.
    pub(crate) fn completed_bits(&self) -> BitVec<u8, Msb0> {
        let mut bits = self.state.read().completed.clone();
        bits.set_uninitialized(false);
        bits
    }
}

impl IndexState {
    fn check_bounds(&self, index: PieceIndex) -> Result<(), CompletionError> {
        if index.as_u32() >= self.capacity {
            return Err(CompletionError::OutOfBounds {
                index,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
