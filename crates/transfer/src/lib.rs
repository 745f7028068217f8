//! Chunked file transfer primitives: block planning, sequential chunk reads,
//! whole-file content digest and per-session block bookkeeping.

mod chunked;
mod digest;
mod progress;
mod types;

use std::path::PathBuf;

pub use chunked::{ByteRange, Chunk, ChunkPlan, ChunkReader, Chunker};
pub use digest::{
    ContentDigest, DigestAccumulator, digest_bytes, digest_file, digest_file_with_plan,
};
pub use progress::SpeedCalculator;
pub use types::{BlockFailure, BlockOutcome, BlockState, UploadSession};

pub use chunkup_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("block {index} out of range (plan has {count} blocks)")]
    OutOfRange { index: usize, count: usize },
}
