use std::fmt;

use serde::Serialize;

use crate::TaskIndex;

/// Contiguous, inclusive range of task indices that is submitted as a single array job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub start: TaskIndex,
    pub end: TaskIndex,
    /// Maximum number of array tasks of this chunk that may run at the same time.
    pub concurrency: u32,
}

impl Chunk {
    pub fn new(start: TaskIndex, end: TaskIndex, concurrency: u32) -> Self {
        debug_assert!(start >= 1 && end >= start);
        Self {
            start,
            end,
            concurrency: concurrency.max(1),
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Splits the chunk into `[start, mid]` and `[mid + 1, end]`.
    /// Returns `None` for a chunk with a single index.
    pub fn bisect(&self) -> Option<(Chunk, Chunk)> {
        if self.start == self.end {
            return None;
        }
        let mid = self.start + (self.end - self.start) / 2;
        Some((
            Chunk::new(self.start, mid, self.concurrency),
            Chunk::new(mid + 1, self.end, self.concurrency),
        ))
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Partitions `[1, total_tasks]` into consecutive chunks of at most `max_chunk_size` indices.
/// All chunks share the same `concurrency` cap.
pub fn plan_chunks(total_tasks: u64, max_chunk_size: u64, concurrency: u32) -> Vec<Chunk> {
    let max_chunk_size = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(total_tasks.div_ceil(max_chunk_size) as usize);
    let mut start = 1;
    while start <= total_tasks {
        let end = total_tasks.min(start + max_chunk_size - 1);
        chunks.push(Chunk::new(start, end, concurrency));
        start = end + 1;
    }
    chunks
}
