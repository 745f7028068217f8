//! Upload error types.

use chunkup_protocol::{ErrorCode, Rejection};
use chunkup_transfer::{BlockFailure, TransferError};

/// Why a single control request (merge, exist) did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors produced by an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no file")]
    NoFile,

    #[error("read error: {0}")]
    Read(#[from] TransferError),

    #[error("file changed between digest and transmission")]
    FileChanged,

    #[error("transmission failed for blocks {:?} of {total}", failed_indices(.failures))]
    Transmission {
        failures: Vec<BlockFailure>,
        total: usize,
    },

    #[error("merge failed: {0}")]
    Merge(RequestFailure),

    #[error("exist check failed: {0}")]
    Exist(RequestFailure),

    #[error("invalid response body: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("block task failed: {0}")]
    Task(String),

    #[error("cancelled")]
    Cancelled,
}

fn failed_indices(failures: &[BlockFailure]) -> Vec<usize> {
    failures.iter().map(BlockFailure::index).collect()
}

impl UploadError {
    /// Caller-facing code: 0 no file, 1 time out, 2 everything else.
    ///
    /// A transmission failure counts as a time out only when every failed
    /// block timed out.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            UploadError::NoFile => ErrorCode::NoFile,
            UploadError::Merge(RequestFailure::Timeout)
            | UploadError::Exist(RequestFailure::Timeout) => ErrorCode::TimedOut,
            UploadError::Transmission { failures, .. }
                if !failures.is_empty() && failures.iter().all(BlockFailure::is_timeout) =>
            {
                ErrorCode::TimedOut
            }
            _ => ErrorCode::Fail,
        }
    }

    /// `{message, errCode}` view of this error.
    pub fn rejection(&self) -> Rejection {
        Rejection::from(self.error_code())
    }

    /// Indices of failed blocks; empty unless this is a transmission failure.
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            UploadError::Transmission { failures, .. } => failed_indices(failures),
            _ => Vec::new(),
        }
    }
}
