use std::time::{Duration, Instant};

use crate::TransferError;
use crate::chunked::ChunkPlan;
use crate::digest::ContentDigest;

/// Why a single block did not get acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockFailure {
    #[error("block {index} rejected with HTTP {status}: {body}")]
    ServerRejected {
        index: usize,
        status: u16,
        body: String,
    },

    #[error("block {index} timed out")]
    Timeout { index: usize },

    #[error("block {index} transport error: {message}")]
    Transport { index: usize, message: String },
}

impl BlockFailure {
    pub fn index(&self) -> usize {
        match self {
            BlockFailure::ServerRejected { index, .. }
            | BlockFailure::Timeout { index }
            | BlockFailure::Transport { index, .. } => *index,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BlockFailure::Timeout { .. })
    }
}

/// Settled result of one block transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Acknowledged,
    Failed(BlockFailure),
}

impl BlockOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, BlockOutcome::Acknowledged)
    }
}

/// Lifecycle of a block within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    Pending,
    InFlight,
    Acknowledged,
    Failed(BlockFailure),
}

impl BlockState {
    pub fn is_settled(&self) -> bool {
        matches!(self, BlockState::Acknowledged | BlockState::Failed(_))
    }
}

/// Per-block bookkeeping for one upload, keyed by content digest and suffix.
///
/// Owned by the coordinator alone; block tasks report outcomes back to it.
#[derive(Debug)]
pub struct UploadSession {
    digest: ContentDigest,
    suffix: String,
    plan: ChunkPlan,
    blocks: Vec<BlockState>,
    acknowledged_bytes: u64,
    started_at: Instant,
}

impl UploadSession {
    /// Creates a session with every block pending.
    pub fn new(digest: ContentDigest, suffix: impl Into<String>, plan: ChunkPlan) -> Self {
        Self {
            digest,
            suffix: suffix.into(),
            plan,
            blocks: vec![BlockState::Pending; plan.count()],
            acknowledged_bytes: 0,
            started_at: Instant::now(),
        }
    }

    pub fn digest(&self) -> ContentDigest {
        self.digest
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn state(&self, index: usize) -> Option<&BlockState> {
        self.blocks.get(index)
    }

    /// Marks `index` as sent and awaiting its outcome.
    pub fn mark_in_flight(&mut self, index: usize) -> Result<(), TransferError> {
        let count = self.blocks.len();
        let slot = self
            .blocks
            .get_mut(index)
            .ok_or(TransferError::OutOfRange { index, count })?;
        *slot = BlockState::InFlight;
        Ok(())
    }

    /// Folds a settled outcome into the session.
    pub fn record(&mut self, index: usize, outcome: BlockOutcome) -> Result<(), TransferError> {
        let count = self.blocks.len();
        let len = self
            .plan
            .range(index)
            .map(|r| r.len())
            .ok_or(TransferError::OutOfRange { index, count })?;
        let slot = &mut self.blocks[index];

        let was_acknowledged = matches!(slot, BlockState::Acknowledged);
        let now_acknowledged = outcome.is_acknowledged();
        *slot = match outcome {
            BlockOutcome::Acknowledged => BlockState::Acknowledged,
            BlockOutcome::Failed(failure) => BlockState::Failed(failure),
        };
        match (was_acknowledged, now_acknowledged) {
            (false, true) => self.acknowledged_bytes += len,
            (true, false) => self.acknowledged_bytes -= len,
            _ => {}
        }
        Ok(())
    }

    pub fn settled_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_settled()).count()
    }

    pub fn acknowledged_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, BlockState::Acknowledged))
            .count()
    }

    /// Bytes of all acknowledged blocks.
    pub fn acknowledged_bytes(&self) -> u64 {
        self.acknowledged_bytes
    }

    /// `true` once every block has a settled outcome.
    pub fn is_settled(&self) -> bool {
        self.blocks.iter().all(BlockState::is_settled)
    }

    /// `true` only when every block is acknowledged; the merge gate.
    pub fn is_complete(&self) -> bool {
        self.blocks
            .iter()
            .all(|b| matches!(b, BlockState::Acknowledged))
    }

    /// Failures in block index order.
    pub fn failures(&self) -> Vec<BlockFailure> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                BlockState::Failed(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures().iter().map(BlockFailure::index).collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
