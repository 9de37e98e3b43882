use std::{fmt, ptr::NonNull};

use crate::{
    chunk::{Chunk, Link, UNIT},
    freelist::FreeList,
};

/// Snapshot of a heap, computed by walking its free list.
///
/// Only the two extension counters are kept across calls; everything else
/// is derived from the blocks currently in the free list, the sentinel
/// excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of blocks in the free list.
    pub item_count: usize,
    /// Payload bytes of the smallest free block.
    pub min: usize,
    /// Payload bytes of the largest free block.
    pub max: usize,
    /// `total_free_bytes / item_count`.
    pub average: usize,
    /// Bytes in the free list, headers included.
    pub total_free_bytes: usize,
    /// Successful heap extensions so far.
    pub extension_calls: usize,
    /// Pages obtained by those extensions.
    pub pages_obtained: usize,
    /// Size of those pages.
    pub page_size: usize,
}

impl HeapStats {
    pub(crate) fn gather(
        sizes: impl IntoIterator<Item = usize>,
        extension_calls: usize,
        pages_obtained: usize,
        page_size: usize,
    ) -> Self {
        let mut stats = HeapStats {
            extension_calls,
            pages_obtained,
            page_size,
            ..Default::default()
        };

        let mut min = usize::MAX;
        for size in sizes {
            min = min.min(size);
            stats.max = stats.max.max(size);
            stats.total_free_bytes += (size + 1) * UNIT;
            stats.item_count += 1;
        }

        if stats.item_count > 0 {
            stats.min = min * UNIT;
            stats.max *= UNIT;
            stats.average = stats.total_free_bytes / stats.item_count;
        }

        stats
    }

    /// Everything ever obtained from the page source is back in the free
    /// list, so nothing can have leaked.
    pub fn is_fully_released(&self) -> bool {
        self.total_free_bytes == self.pages_obtained * self.page_size
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t\tHeap Memory Statistics")?;
        writeln!(f, "----------------------------------------------------")?;
        writeln!(f)?;
        writeln!(f, "\tNumber of blocks in free list: {}", self.item_count)?;
        writeln!(f, "\tMin: {}", self.min)?;
        writeln!(f, "\tMax: {}", self.max)?;
        writeln!(f, "\tAverage: {}", self.average)?;
        writeln!(f, "\tTotal bytes in free list: {}", self.total_free_bytes)?;
        writeln!(f, "\tNumber of heap extensions: {}", self.extension_calls)?;
        writeln!(f, "\tNumber of requested pages: {}", self.pages_obtained)?;
        write!(
            f,
            "\tHeap status:  {}",
            if self.is_fully_released() {
                "all memory is in the heap -- no leaks are possible"
            } else {
                "heap is in-use -- leaks are possible"
            }
        )
    }
}

/// Listing of the free list for debugging, one line per member starting at
/// the rover, sentinel included.
///
/// Each block line shows its header address `p`, its `size` in units and
/// its `end`, the first byte past the block.
pub struct Dump<'a> {
    pub(crate) list: &'a FreeList,
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for link in self.list.nodes_from(self.list.rover()) {
            let next = self.list.next_of(link);

            match link {
                Link::Sentinel => writeln!(f, "p=sentinel, size=0, next={next} <-- dummy")?,
                Link::Chunk(chunk) => writeln!(
                    f,
                    "p={:p}, size={}, end={:p}, next={next}",
                    chunk,
                    units_of(chunk),
                    Chunk::end(chunk)
                )?,
            }
        }

        Ok(())
    }
}

fn units_of(chunk: NonNull<Chunk>) -> usize {
    unsafe { chunk.as_ref().size }
}
