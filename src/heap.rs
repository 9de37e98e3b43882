use std::ptr::NonNull;

use crate::{
    chunk::{Chunk, Link, UNIT, units_for},
    config::Config,
    error::{AllocError, ConfigError, Corruption},
    freelist::FreeList,
    kernel::{PageProvider, PageSource},
    policy::{SearchStart, Strategy},
    stats::{Dump, HeapStats},
    utils::align,
};

/// A free-list heap growing page by page out of a [`PageSource`].
///
/// Free blocks sit in a circular list anchored at a sentinel. A request is
/// rounded up to whole units and served from a suitable free block chosen
/// by the configured [`Policy`](crate::Policy); if there is none, the heap
/// grows by enough pages to hold it. Blocks are carved from the right end of
/// the chosen free block, so the free block keeps its place in the list and
/// only shrinks:
///
/// ```text
///  before   +------+-------------------------------------------+
///           | hdr  |                  free (size)              |
///           +------+-------------------------------------------+
///
///  after    +------+--------------------------+------+---------+
///           | hdr  |  free (size - nunits - 1) | hdr  | nunits  |
///           +------+--------------------------+------+---------+
///                                                     ^
///                                                     returned pointer
/// ```
///
/// A block that would leave less than a header and one unit behind is
/// handed out whole instead. Released blocks are pushed back onto the head
/// of the list as they are, unless [`Config::coalescing`] is set: then the
/// list is kept in address order and a released block merges with the free
/// blocks it touches.
///
/// Memory obtained from the source is never given back.
///
/// A `Heap` is not synchronized. Wrap it in a
/// [`LockedHeap`](crate::LockedHeap) (or any other lock) to share it.
pub struct Heap<S> {
    provider: PageProvider<S>,
    free: FreeList,
    config: Config,
}

// SAFETY: every header the free list points at lives in memory obtained by
// this heap's own provider, so moving the heap moves exclusive access to it.
unsafe impl<S: Send> Send for Heap<S> {}

impl<S> Heap<S> {
    /// Creates an empty heap. Nothing is requested from `source` until the
    /// first allocation.
    ///
    /// # Panics
    ///
    /// Panics if the page size of `config` is not a power of two holding a
    /// whole number of units. See [`Heap::try_new`] for a fallible version.
    pub const fn new(source: S, config: Config) -> Self {
        assert!(
            config.page_size.is_power_of_two() && config.page_size % UNIT == 0,
            "page size must be a power of two and a multiple of the unit size"
        );

        Self {
            provider: PageProvider::new(source, config.page_size),
            free: FreeList::new(),
            config,
        }
    }

    /// Creates an empty heap, rejecting a page size that [`Heap::new`] would
    /// panic on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadPageSize`] if [`Config::validate`] fails.
    pub fn try_new(source: S, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(source, config))
    }

    /// The configuration the heap was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The page source backing this heap.
    pub fn source(&self) -> &S {
        self.provider.source()
    }

    /// Usable bytes of a live allocation, which is at least what was asked
    /// for.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Heap::allocate`] on this heap and
    /// not released since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe { Chunk::from_payload(ptr).as_ref().size * UNIT }
    }

    /// Walks the free list and reports on it.
    pub fn stats(&self) -> HeapStats {
        HeapStats::gather(
            self.free.iter().map(|(_, size)| size),
            self.provider.extension_calls(),
            self.provider.pages_obtained(),
            self.provider.page_size(),
        )
    }

    /// Human readable listing of the free list, starting at the rover.
    pub fn dump(&self) -> Dump<'_> {
        if let Err(corruption) = self.validate() {
            log::warn!("dumping an inconsistent free list: {corruption}");
        }

        Dump { list: &self.free }
    }

    /// Checks the free list for consistency.
    ///
    /// The sentinel must be reached again after a bounded number of steps,
    /// the rover must be a member, no free block may be empty and the list
    /// may not hold more bytes than were ever obtained. With coalescing the
    /// blocks must also be in address order without overlapping.
    pub fn validate(&self) -> Result<(), Corruption> {
        let obtained = self.provider.bytes_obtained();
        // Every free block takes at least two units.
        let limit = obtained / (2 * UNIT);

        let rover = self.free.rover();
        let mut found_rover = rover == Link::Sentinel;
        let mut free = 0usize;
        let mut steps = 0;

        let mut link = self.free.head();
        while let Link::Chunk(chunk) = link {
            if steps == limit {
                return Err(Corruption::Cycle);
            }
            steps += 1;

            let size = unsafe { chunk.as_ref().size };
            if size == 0 {
                return Err(Corruption::EmptyBlock {
                    at: chunk.as_ptr() as usize,
                });
            }

            found_rover |= link == rover;
            free = free.saturating_add(size.saturating_add(1).saturating_mul(UNIT));
            link = self.free.next_of(link);
        }

        if !found_rover {
            return Err(Corruption::RoverLost);
        }

        if free > obtained {
            return Err(Corruption::Overcommitted { free, obtained });
        }

        if self.config.coalescing {
            self.validate_order()?;
        }

        Ok(())
    }

    /// With coalescing the blocks ascend in address order from the sentinel
    /// round to it again, and none reaches into the next one.
    fn validate_order(&self) -> Result<(), Corruption> {
        let blocks: Vec<_> = self.free.iter().map(|(chunk, _)| chunk).collect();

        for pair in blocks.windows(2) {
            let (chunk, next) = (pair[0], pair[1]);
            let at = chunk.as_ptr() as usize;

            if next <= chunk {
                return Err(Corruption::OutOfOrder { at });
            }
            if Chunk::end(chunk) > next.as_ptr().cast_const().cast() {
                return Err(Corruption::Overlap { at });
            }
        }

        Ok(())
    }
}

impl<S: PageSource> Heap<S> {
    /// Allocates at least `nbytes` bytes.
    ///
    /// The returned pointer is aligned to [`UNIT`] and stays valid until it
    /// is passed to [`Heap::release`].
    ///
    /// # Errors
    ///
    /// Fails if no free block is large enough and the page source cannot
    /// grow. The heap is unchanged in that case.
    ///
    /// # Panics
    ///
    /// Panics if `nbytes` is 0.
    pub fn allocate(&mut self, nbytes: usize) -> Result<NonNull<u8>, AllocError> {
        assert!(nbytes > 0, "cannot allocate 0 bytes");

        let nunits = units_for(nbytes);

        let start = match self.config.start {
            SearchStart::Head => Link::Sentinel,
            SearchStart::Rover => self.free.rover(),
        };

        let found = self
            .config
            .policy
            .select(self.free.candidates_from(start, nunits));

        let chunk = match found {
            Some((chunk, _)) => chunk,
            None => {
                let bytes = self
                    .growth_for(nunits)
                    .ok_or(AllocError::TooLarge { requested: nbytes })?;
                self.more_core(bytes)?
            }
        };

        // SAFETY: `chunk` is a member of the free list with at least
        // `nunits` units.
        let block = unsafe { self.carve(chunk, nunits) };
        let ptr = Chunk::payload(block);

        log::trace!("allocated {nbytes} bytes ({nunits} units) at {ptr:p}");

        Ok(ptr)
    }

    /// Gives the block at `ptr` back to the heap.
    ///
    /// Without coalescing the block becomes the first one a search from the
    /// head looks at and is not merged with its neighbours. With coalescing
    /// it takes its place in address order and merges with the free blocks
    /// it touches. Nothing is returned to the page source either way.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Heap::allocate`] on this heap and
    /// must not have been released already. Neither is checked.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) {
        unsafe {
            let chunk = Chunk::from_payload(ptr);
            log::trace!("released {} units at {ptr:p}", chunk.as_ref().size);
            self.insert(chunk);
        }
    }

    /// Bytes to request from the provider for a block of `nunits` units plus
    /// its header, rounded up to whole pages.
    fn growth_for(&self, nunits: usize) -> Option<usize> {
        let bytes = nunits.checked_add(1)?.checked_mul(UNIT)?;
        align(bytes, self.provider.page_size())
    }

    /// Grows the heap by `bytes` and puts the new memory in the free list as
    /// a single block. With coalescing it may merge with the block before
    /// it, in which case the merged block is returned.
    fn more_core(&mut self, bytes: usize) -> Result<NonNull<Chunk>, AllocError> {
        let Some(region) = self.provider.extend(bytes) else {
            log::warn!("page source exhausted, cannot extend the heap by {bytes} bytes");
            return Err(AllocError::OutOfMemory { bytes });
        };

        // SAFETY: the region is fresh, page aligned and `bytes` long; one
        // unit of it becomes the header.
        unsafe {
            let chunk = Chunk::write(region, Link::Sentinel, bytes / UNIT - 1);
            Ok(self.insert(chunk))
        }
    }

    /// Puts a block into the free list the way the configuration asks for
    /// and returns the block that now holds its memory.
    ///
    /// **SAFETY**: `chunk` must be a valid header that is not in the list.
    unsafe fn insert(&mut self, chunk: NonNull<Chunk>) -> NonNull<Chunk> {
        unsafe {
            if self.config.coalescing {
                self.free.insert_sorted(chunk)
            } else {
                self.free.push_front(chunk);
                chunk
            }
        }
    }

    /// Takes `nunits` units out of the free block `chunk` and returns the
    /// header of the block to hand out.
    ///
    /// **SAFETY**: `chunk` must be a member of the free list holding at least
    /// `nunits` units.
    unsafe fn carve(&mut self, mut chunk: NonNull<Chunk>, nunits: usize) -> NonNull<Chunk> {
        unsafe {
            let size = chunk.as_ref().size;
            debug_assert!(size >= nunits);

            if size > nunits + 1 {
                let block = Chunk::tail(chunk, nunits);
                // Detached blocks carry no meaningful link.
                block.as_ptr().write(Chunk {
                    next: Link::Sentinel,
                    size: nunits,
                });

                chunk.as_mut().size = size - nunits - 1;
                self.free.set_rover(chunk.as_ref().next);

                block
            } else {
                let successor = self.free.unlink(chunk);
                self.free.set_rover(successor);

                chunk
            }
        }
    }
}
