use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::{kernel::PageSource, utils::padding};

/// A bounded [`PageSource`] carved out of a single page aligned buffer.
///
/// The buffer is obtained once, up front, from the system allocator and
/// handed out front to back, so regions come out contiguous and in ascending
/// address order exactly like the program break does. Once it runs out every
/// further request fails, which makes it the natural backing for tests and
/// for hosts that want a hard cap on the heap.
///
/// ```text
/// +--------+--------+--------+------------------------------+
/// | page 0 | page 1 | page 2 |            unused            |
/// +--------+--------+--------+------------------------------+
/// ^                          ^                              ^
/// base                       base + used                    base + capacity
/// ```
pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    used: usize,
}

// SAFETY: the arena exclusively owns its buffer.
unsafe impl Send for Arena {}

impl Arena {
    /// Creates an arena able to hand out `pages` pages of `page_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two, if the arena would be
    /// empty, or if the backing buffer cannot be allocated.
    pub fn new(pages: usize, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        assert!(pages > 0, "an arena needs at least one page");

        let layout = pages
            .checked_mul(page_size)
            .and_then(|size| Layout::from_size_align(size, page_size).ok())
            .unwrap_or_else(|| panic!("{pages} pages of {page_size} bytes do not fit in memory"));

        let base = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(base) else {
            alloc::handle_alloc_error(layout);
        };

        Self {
            base,
            layout,
            used: 0,
        }
    }

    /// Total number of bytes the arena can hand out.
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Whether `ptr` points inside the part of the buffer handed out so far.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        (start..start + self.used).contains(&(ptr as usize))
    }
}

unsafe impl PageSource for Arena {
    fn request_memory(&mut self, len: usize, align: usize) -> Option<NonNull<u8>> {
        // The buffer is only aligned to the page size it was built with, so
        // pad from the address rather than from the offset.
        let next = (self.base.as_ptr() as usize).checked_add(self.used)?;
        let offset = self.used.checked_add(padding(next, align))?;
        let end = offset.checked_add(len)?;

        if end > self.capacity() {
            log::trace!("arena exhausted: {len} bytes requested, {} left", self.capacity() - self.used);
            return None;
        }

        self.used = end;

        // SAFETY: `offset + len` is within the buffer.
        Some(unsafe { self.base.add(offset) })
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_contiguous_regions() {
        let mut arena = Arena::new(4, 4096);

        let first = arena.request_memory(4096, 4096).unwrap();
        let second = arena.request_memory(2 * 4096, 4096).unwrap();

        assert_eq!(first.as_ptr() as usize % 4096, 0);
        assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 4096);
        assert_eq!(arena.used(), 3 * 4096);
        assert!(arena.contains(second.as_ptr()));
        assert!(!arena.contains(unsafe { second.as_ptr().add(2 * 4096) }));
    }

    #[test]
    fn fails_once_exhausted() {
        let mut arena = Arena::new(2, 4096);

        assert!(arena.request_memory(3 * 4096, 4096).is_none());
        assert!(arena.request_memory(2 * 4096, 4096).is_some());
        assert!(arena.request_memory(4096, 4096).is_none());
        assert_eq!(arena.used(), arena.capacity());
    }

    #[test]
    fn regions_follow_alignments_larger_than_the_page() {
        let mut arena = Arena::new(16, 4096);

        for _ in 0..3 {
            let region = arena.request_memory(8192, 8192).unwrap();
            assert_eq!(region.as_ptr() as usize % 8192, 0);
            assert!(arena.used() <= arena.capacity());
        }
    }
}
