//! Upload tuning knobs. Every field has a default so partial config files
//! deserialize cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chunkup_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_TIMEOUT};
use chunkup_transfer::BlockFailure;

/// Default number of blocks in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Settings for one [`UploadCoordinator`](crate::UploadCoordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Block size in bytes (0 means 1 MiB).
    pub chunk_size: usize,
    /// Deadline for each block upload, merge and exist request.
    pub request_timeout_ms: u64,
    /// Upper bound on concurrently uploading blocks.
    pub max_concurrency: usize,
    /// Block-level retry; one attempt unless configured otherwise.
    pub retry: RetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Concurrency bound, never below 1.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

/// Bounded retry with exponential backoff, applied per block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per block, including the first (0 behaves as 1).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a block that failed on attempt `attempt` (1-based) gets another.
    ///
    /// Client errors (4xx) are final; timeouts, transport errors and 5xx are
    /// retried.
    pub fn should_retry(&self, attempt: u32, failure: &BlockFailure) -> bool {
        if attempt >= self.max_attempts.max(1) {
            return false;
        }
        match failure {
            BlockFailure::ServerRejected { status, .. } => !(400..500).contains(status),
            BlockFailure::Timeout { .. } | BlockFailure::Transport { .. } => true,
        }
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
