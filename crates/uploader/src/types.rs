//! Coordinator states and progress events.

use std::fmt;
use std::time::Duration;

use chunkup_transfer::ContentDigest;

/// Protocol state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    Idle,
    Digesting,
    Transmitting,
    Merging,
    Done,
    Failed,
}

impl UploadState {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadState::Idle => "idle",
            UploadState::Digesting => "digesting",
            UploadState::Transmitting => "transmitting",
            UploadState::Merging => "merging",
            UploadState::Done => "done",
            UploadState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The coordinator entered a new state.
    StateChanged(UploadState),
    /// Digest pass finished.
    Digested {
        digest: ContentDigest,
        size: u64,
        blocks: usize,
    },
    /// A block reached its final outcome.
    BlockSettled {
        index: usize,
        acknowledged: bool,
        settled: usize,
        total: usize,
        bytes_per_second: f64,
        /// Time left for the unacknowledged bytes at the current speed.
        eta: Option<Duration>,
    },
    /// A block failed and will be sent again after `delay`.
    Retrying {
        index: usize,
        attempt: u32,
        delay: Duration,
    },
}
