//! Whole-file MD5 content digest, fed block by block.

use std::fmt;
use std::path::Path;

use md5::{Digest, Md5};
use tracing::debug;

use crate::TransferError;
use crate::chunked::{ChunkPlan, ChunkReader};

/// 128-bit MD5 of a file's full content. Displays as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex form, as sent on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental MD5 state. Blocks must be appended in index order.
#[derive(Default)]
pub struct DigestAccumulator {
    hasher: Md5,
    bytes: u64,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes appended so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> ContentDigest {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.hasher.finalize());
        ContentDigest(out)
    }
}

/// Computes the digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> ContentDigest {
    let mut acc = DigestAccumulator::new();
    acc.update(data);
    acc.finalize()
}

/// Digests `path` by streaming its blocks through one accumulator.
///
/// Any read failure aborts; no partial digest is returned.
pub async fn digest_file(path: &Path, chunk_size: usize) -> Result<ContentDigest, TransferError> {
    digest_file_with_plan(path, chunk_size)
        .await
        .map(|(digest, _)| digest)
}

/// Like [`digest_file`], also returning the plan the file was read with, so
/// a later pass can detect a size change.
pub async fn digest_file_with_plan(
    path: &Path,
    chunk_size: usize,
) -> Result<(ContentDigest, ChunkPlan), TransferError> {
    let mut reader = ChunkReader::open(path, chunk_size).await?;
    let plan = *reader.plan();
    let mut acc = DigestAccumulator::new();
    reader.for_each(|chunk| acc.update(&chunk.data)).await?;

    let digest = acc.finalize();
    debug!(path = %path.display(), %digest, blocks = plan.count(), "file digested");
    Ok((digest, plan))
}
