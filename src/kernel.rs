use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Virtual memory page size of the computer, cached after the first query.
/// This is usually 4096.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// This trait provides an abstraction over the one thing the heap needs
/// from its environment: more memory. As the allocator, our top level view
/// of this has nothing to do with the concrete syscalls offered by each
/// kernel.
///
/// # Safety
///
/// Every region returned by [`PageSource::request_memory`] must be valid for
/// reads and writes of `len` bytes, must not overlap any other region this
/// source has handed out and must stay valid for as long as the source is
/// alive. Memory is never given back.
pub unsafe trait PageSource {
    /// Request a memory region of `len` bytes starting at a multiple of
    /// `align`. Returns `None` if the underlying primitive cannot grow any
    /// further.
    fn request_memory(&mut self, len: usize, align: usize) -> Option<NonNull<u8>>;
}

/// Wrapper around a [`PageSource`] that only deals in whole pages and keeps
/// count of what it obtained.
pub(crate) struct PageProvider<S> {
    source: S,
    page_size: usize,
    /// Number of successful calls to [`PageProvider::extend`].
    extension_calls: usize,
    /// Total number of pages obtained from `source`.
    pages_obtained: usize,
}

impl<S> PageProvider<S> {
    pub const fn new(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size,
            extension_calls: 0,
            pages_obtained: 0,
        }
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn extension_calls(&self) -> usize {
        self.extension_calls
    }

    #[inline]
    pub fn pages_obtained(&self) -> usize {
        self.pages_obtained
    }

    /// Bytes obtained so far, which is everything the heap can ever hand out.
    #[inline]
    pub fn bytes_obtained(&self) -> usize {
        self.pages_obtained * self.page_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PageSource> PageProvider<S> {
    /// Grows the heap by `bytes`, which must be a positive multiple of the
    /// page size.
    ///
    /// Returns a new page aligned region, or `None` if the source is
    /// exhausted, in which case the counters are left alone.
    pub fn extend(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        assert!(
            bytes > 0 && bytes % self.page_size == 0,
            "heap extension of {bytes} bytes is not a whole number of {} byte pages",
            self.page_size
        );

        let region = self.source.request_memory(bytes, self.page_size)?;

        self.extension_calls += 1;
        self.pages_obtained += bytes / self.page_size;

        log::debug!(
            "heap extended by {} pages at {:p} ({} calls, {} pages total)",
            bytes / self.page_size,
            region,
            self.extension_calls,
            self.pages_obtained
        );

        Some(region)
    }
}

/// Returns the virtual memory page size of the computer in bytes.
#[inline]
pub fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = os_page_size();
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

#[cfg(not(any(unix, windows)))]
fn os_page_size() -> usize {
    4096
}

#[cfg(unix)]
pub use unix::{Mmap, Sbrk};

#[cfg(unix)]
use unix::os_page_size;

#[cfg(unix)]
mod unix {
    use super::PageSource;
    use crate::utils::padding;

    use libc::{c_int, c_void, intptr_t, mmap, off_t, sbrk, size_t};

    use std::ptr::NonNull;

    pub(super) fn os_page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }

    /// Grows the heap by moving the program break.
    ///
    /// Regions come out contiguous and in ascending address order. The
    /// break is not necessarily page aligned when we first see it, so the
    /// first request may be padded; the padding is never handed out.
    ///
    /// Nothing synchronizes the break with other users of it (such as the
    /// system allocator), so only use this where the heap is the sole owner
    /// of the break, typically as the `#[global_allocator]`.
    #[derive(Debug, Default)]
    pub struct Sbrk;

    impl Sbrk {
        pub const fn new() -> Self {
            Self
        }
    }

    unsafe impl PageSource for Sbrk {
        fn request_memory(&mut self, len: usize, align: usize) -> Option<NonNull<u8>> {
            const FAILED: *mut c_void = usize::MAX as *mut c_void;

            unsafe {
                let current = sbrk(0);
                if current == FAILED {
                    return None;
                }

                let pad = padding(current as usize, align);
                let increment = intptr_t::try_from(len.checked_add(pad)?).ok()?;

                let addr = sbrk(increment);
                if addr == FAILED {
                    return None;
                }

                NonNull::new(addr.cast::<u8>().add(pad))
            }
        }
    }

    /// Grows the heap with anonymous private mappings.
    ///
    /// [`libc::mmap`] gives us memory regions aligned with the computer page
    /// size, but we cannot assume they are adjacent. Larger alignments are
    /// obtained by mapping a little more and unmapping the unaligned head and
    /// the excess tail:
    ///
    /// ```text
    /// +------+---------------------------------+------+
    /// | head |          len bytes              | tail |
    /// +------+---------------------------------+------+
    ///        ^ multiple of align
    /// ```
    #[derive(Debug, Default)]
    pub struct Mmap;

    impl Mmap {
        pub const fn new() -> Self {
            Self
        }
    }

    unsafe impl PageSource for Mmap {
        fn request_memory(&mut self, len: usize, align: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            // mmap already aligns to the system page, so only the rest of
            // the alignment has to be made up for.
            let slack = align.saturating_sub(super::page_size());
            let total = len.checked_add(slack)?;

            let addr = unsafe { mmap(ADDR, total as size_t, PROT, FLAGS, FD, OFFSET) };

            if addr == libc::MAP_FAILED {
                return None;
            }

            let head = padding(addr as usize, align);
            let tail = total - head - len;

            unsafe {
                if head > 0 {
                    libc::munmap(addr, head as size_t);
                }
                if tail > 0 {
                    libc::munmap(addr.cast::<u8>().add(head + len).cast(), tail as size_t);
                }

                NonNull::new(addr.cast::<u8>().add(head))
            }
        }
    }
}

#[cfg(windows)]
pub use self::windows::VirtualMemory;

#[cfg(windows)]
use self::windows::os_page_size;

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::PageSource;
    use crate::utils::padding;

    use windows::Win32::System::{Memory, SystemInformation};

    pub(super) fn os_page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }

    /// Grows the heap with committed `VirtualAlloc` regions.
    #[derive(Debug, Default)]
    pub struct VirtualMemory;

    impl VirtualMemory {
        pub const fn new() -> Self {
            Self
        }
    }

    unsafe impl PageSource for VirtualMemory {
        fn request_memory(&mut self, len: usize, align: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let mut addr = Memory::VirtualAlloc(None, len, flags, protection);

                if !addr.is_null() && padding(addr as usize, align) != 0 {
                    // Regions can only be released whole, so find an aligned
                    // spot in a larger reservation and allocate exactly there.
                    let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);

                    let reservation = Memory::VirtualAlloc(
                        None,
                        len.checked_add(align)?,
                        Memory::MEM_RESERVE,
                        Memory::PAGE_NOACCESS,
                    );
                    if reservation.is_null() {
                        return None;
                    }
                    let start = reservation as usize;
                    let aligned = (start + padding(start, align)) as *const c_void;
                    let _ = Memory::VirtualFree(reservation, 0, Memory::MEM_RELEASE);

                    addr = Memory::VirtualAlloc(Some(aligned), len, flags, protection);
                }

                NonNull::new(addr.cast())
            }
        }
    }
}
