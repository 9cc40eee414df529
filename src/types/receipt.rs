//! Execution receipt for batch processing results.
//!
//! The ExecutionReceipt summarizes one batch of engine calls, including the
//! state root of the engine after the batch committed.

use ssz_rs::prelude::*;
use sha2::{Digest, Sha256};

/// Execution receipt summarizing a committed batch.
///
/// ## State Root
///
/// The 32-byte state root is a SHA-256 hash over the ledger, the pools and
/// the fee schedule (see `Engine::state_root`). Two engines that processed
/// the same calls from the same starting state report identical roots.
///
/// ## Example
///
/// ```
/// use grid_settlement::types::ExecutionReceipt;
///
/// let receipt = ExecutionReceipt::new(
///     1,          // batch_id
///     4,          // calls_processed
///     2,          // fills_executed
///     [0u8; 32],  // state_root (would be computed)
/// );
/// assert!(!receipt.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct ExecutionReceipt {
    /// Batch sequence number
    pub batch_id: u64,

    /// Number of calls executed in this batch
    pub calls_processed: u64,

    /// Number of market orders and flash swaps filled in this batch
    pub fills_executed: u64,

    /// Engine state root after the batch (SHA-256, 32 bytes)
    pub state_root: [u8; 32],
}

impl ExecutionReceipt {
    pub fn new(
        batch_id: u64,
        calls_processed: u64,
        fills_executed: u64,
        state_root: [u8; 32],
    ) -> Self {
        Self {
            batch_id,
            calls_processed,
            fills_executed,
            state_root,
        }
    }

    /// Compute SHA-256 hash of the given data
    ///
    /// Returns a 32-byte array suitable for use as a state root.
    pub fn compute_hash(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    /// Get the state root as a hex string
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }

    /// Check if this receipt represents an empty batch
    pub fn is_empty(&self) -> bool {
        self.calls_processed == 0
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
