use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{chunk::UNIT, heap::Heap, kernel::PageSource};

/// Locking wrapper that makes a [`Heap`] usable as the global allocator.
///
/// The heap itself is single threaded; this serializes every call through a
/// spin lock, which is all a `#[global_allocator]` needs:
///
/// ```no_run,standalone_crate
/// # #[cfg(unix)]
/// # mod demo {
/// use chunkheap::{Config, Heap, LockedHeap, Sbrk};
///
/// #[global_allocator]
/// static ALLOCATOR: LockedHeap<Sbrk> = LockedHeap::new(Heap::new(Sbrk::new(), Config::new()));
/// # }
/// # fn main() {}
/// ```
///
/// Allocations are aligned to [`UNIT`]; layouts asking for more fail.
///
/// The heap logs through the `log` facade. A logger that allocates would
/// re-enter the lock, so install none (or a non-allocating one) when the
/// heap is the global allocator.
pub struct LockedHeap<S>(Mutex<Heap<S>>);

impl<S> LockedHeap<S> {
    pub const fn new(heap: Heap<S>) -> Self {
        Self(Mutex::new(heap))
    }

    /// Locks the heap, for statistics or direct use.
    pub fn lock(&self) -> MutexGuard<'_, Heap<S>> {
        self.0.lock()
    }
}

unsafe impl<S: PageSource + Send> GlobalAlloc for LockedHeap<S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > UNIT {
            return ptr::null_mut();
        }

        self.0
            .lock()
            .allocate(layout.size().max(1))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            unsafe { self.0.lock().release(ptr) };
        }
    }
}
