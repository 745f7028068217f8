use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition of `[0, size)` into fixed-size blocks; the last may be shorter.
///
/// The plan holds no cursor. Every traversal gets its own [`Chunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plans `size` bytes in blocks of `chunk_size`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (1 MiB) is used.
    pub fn new(size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self { size, chunk_size }
    }

    /// Total bytes covered by the plan.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Nominal block length.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of blocks: `ceil(size / chunk_size)`, 0 for an empty file.
    pub fn count(&self) -> usize {
        self.size.div_ceil(self.chunk_size as u64) as usize
    }

    /// Byte range of block `index`, or `None` past the end.
    pub fn range(&self, index: usize) -> Option<ByteRange> {
        if index >= self.count() {
            return None;
        }
        let start = index as u64 * self.chunk_size as u64;
        let end = (start + self.chunk_size as u64).min(self.size);
        Some(ByteRange { start, end })
    }

    /// Iterates all ranges in index order.
    pub fn ranges(&self) -> impl Iterator<Item = ByteRange> + '_ {
        (0..self.count()).filter_map(move |i| self.range(i))
    }

    /// Returns a fresh cursor positioned at block 0.
    pub fn chunker(&self) -> Chunker {
        Chunker {
            plan: *self,
            cursor: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Chunker
// ---------------------------------------------------------------------------

/// Single-pass cursor over a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct Chunker {
    plan: ChunkPlan,
    cursor: usize,
}

impl Chunker {
    pub fn new(size: u64, chunk_size: usize) -> Self {
        ChunkPlan::new(size, chunk_size).chunker()
    }

    /// Returns `true` while unvisited blocks remain.
    pub fn has_more(&self) -> bool {
        self.cursor < self.plan.count()
    }

    /// Index the next call to [`next_range`](Self::next_range) will return.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Returns the next range and advances the cursor.
    ///
    /// Fails with [`TransferError::OutOfRange`] once the plan is exhausted.
    pub fn next_range(&mut self) -> Result<ByteRange, TransferError> {
        let range = self
            .plan
            .range(self.cursor)
            .ok_or(TransferError::OutOfRange {
                index: self.cursor,
                count: self.plan.count(),
            })?;
        self.cursor += 1;
        Ok(range)
    }

    /// Drives the cursor to exhaustion, calling `visit(index, range)` per block.
    pub fn for_each<F>(&mut self, mut visit: F)
    where
        F: FnMut(usize, ByteRange),
    {
        while let Some(range) = self.plan.range(self.cursor) {
            let index = self.cursor;
            self.cursor += 1;
            visit(index, range);
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// One block of file data.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based block index.
    pub index: usize,
    /// Byte range within the file.
    pub range: ByteRange,
    /// Raw block bytes; `data.len() == range.len()`.
    pub data: Vec<u8>,
}

/// Reads a file block by block, strictly in index order.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunker: Chunker,
    path: PathBuf,
}

impl ChunkReader {
    /// Opens `path` and plans it with `chunk_size` (0 means the default).
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let read_err = |source| TransferError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(read_err)?;
        let size = file.metadata().await.map_err(read_err)?.len();
        Ok(Self {
            file,
            chunker: Chunker::new(size, chunk_size),
            path: path.to_path_buf(),
        })
    }

    pub fn has_more(&self) -> bool {
        self.chunker.has_more()
    }

    pub fn plan(&self) -> &ChunkPlan {
        self.chunker.plan()
    }

    /// Total file size as observed at open time.
    pub fn file_size(&self) -> u64 {
        self.chunker.plan().size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next block.
    ///
    /// A file that shrank since [`open`](Self::open) surfaces as
    /// [`TransferError::Read`] with `UnexpectedEof`.
    pub async fn next_chunk(&mut self) -> Result<Chunk, TransferError> {
        let index = self.chunker.position();
        let range = self.chunker.next_range()?;

        let mut data = vec![0u8; range.len() as usize];
        self.file
            .read_exact(&mut data)
            .await
            .map_err(|source| TransferError::Read {
                path: self.path.clone(),
                source,
            })?;

        Ok(Chunk { index, range, data })
    }

    /// Reads every remaining block in order, calling `visit` for each.
    pub async fn for_each<F>(&mut self, mut visit: F) -> Result<(), TransferError>
    where
        F: FnMut(Chunk),
    {
        while self.has_more() {
            let chunk = self.next_chunk().await?;
            visit(chunk);
        }
        Ok(())
    }
}
