use std::{mem, ptr::NonNull};

/// Size in bytes of one allocation unit. Every size the heap deals with is a
/// whole number of these, and a header occupies exactly one.
pub const UNIT: usize = mem::size_of::<Chunk>();

/// A reference to a member of the free list.
///
/// The sentinel has no address of its own: it lives inside the [`Heap`]
/// as the list anchor, so it is spelled out here instead of pointing at it.
///
/// [`Heap`]: crate::Heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    Sentinel,
    Chunk(NonNull<Chunk>),
}

/// Block header. It precedes every block of heap memory, free or allocated.
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        | -> Header (1 unit)
/// |        size         |        |
/// +---------------------+ <------+ <- pointer handed to the caller
/// |       Payload       |        |
/// |         ...         |        | -> `size` units
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// `next` is only meaningful while the block sits in the free list; an
/// allocated block keeps its header so that `release` can recover `size`.
#[repr(C)]
pub(crate) struct Chunk {
    /// Next free block in the circular list.
    pub next: Link,
    /// Payload length in units, header excluded.
    pub size: usize,
}

impl Chunk {
    /// Writes a fresh header at `at`.
    ///
    /// **SAFETY**: `at` must be valid for writes of one unit and aligned to
    /// [`Chunk`].
    pub unsafe fn write(at: NonNull<u8>, next: Link, size: usize) -> NonNull<Chunk> {
        let header = at.cast::<Chunk>();
        unsafe { header.as_ptr().write(Chunk { next, size }) };
        header
    }

    /// First payload byte of the block described by `header`.
    #[inline]
    pub fn payload(header: NonNull<Chunk>) -> NonNull<u8> {
        // SAFETY: every header is followed by at least one payload unit, so
        // the pointer one unit further is still inside the same block.
        unsafe { header.add(1).cast() }
    }

    /// Header of the block whose payload starts at `ptr`.
    ///
    /// **SAFETY**: `ptr` must have been produced by [`Chunk::payload`].
    #[inline]
    pub unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Chunk> {
        unsafe { ptr.cast::<Chunk>().sub(1) }
    }

    /// Header of the block made of the rightmost `nunits` payload units of
    /// `header` plus one unit in front of them for its own header.
    ///
    /// **SAFETY**: `header` must be a valid block with `size > nunits`.
    #[inline]
    pub unsafe fn tail(header: NonNull<Chunk>, nunits: usize) -> NonNull<Chunk> {
        unsafe {
            let size = header.as_ref().size;
            header.add(size - nunits)
        }
    }

    /// One past the last byte of the block, header included.
    pub fn end(header: NonNull<Chunk>) -> *const u8 {
        unsafe {
            let size = header.as_ref().size;
            header.as_ptr().cast::<u8>().wrapping_add((size + 1) * UNIT)
        }
    }
}

/// Number of units needed to hold `nbytes` bytes.
#[inline]
pub const fn units_for(nbytes: usize) -> usize {
    nbytes.div_ceil(UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_one_pointer_and_one_word() {
        assert_eq!(UNIT, 2 * mem::size_of::<usize>());
        assert_eq!(mem::size_of::<Link>(), mem::size_of::<usize>());
    }

    #[test]
    fn units_round_up() {
        assert_eq!(units_for(1), 1);
        assert_eq!(units_for(UNIT), 1);
        assert_eq!(units_for(UNIT + 1), 2);
        assert_eq!(units_for(16 * UNIT - 1), 16);
    }

    #[test]
    fn payload_and_header_are_one_unit_apart() {
        let mut backing = [0usize; 8];
        let base = NonNull::new(backing.as_mut_ptr().cast::<u8>()).unwrap();

        unsafe {
            let header = Chunk::write(base, Link::Sentinel, 3);
            let payload = Chunk::payload(header);

            assert_eq!(payload.as_ptr() as usize - base.as_ptr() as usize, UNIT);
            assert_eq!(Chunk::from_payload(payload), header);
            assert_eq!(Chunk::end(header) as usize - base.as_ptr() as usize, 4 * UNIT);
        }
    }

    #[test]
    fn tail_takes_rightmost_units() {
        let mut backing = [0usize; 16];
        let base = NonNull::new(backing.as_mut_ptr().cast::<u8>()).unwrap();

        unsafe {
            let header = Chunk::write(base, Link::Sentinel, 7);
            let tail = Chunk::tail(header, 2);

            // 7 payload units: header at 0, split header at 5, payload 6..=7.
            assert_eq!(tail.as_ptr() as usize - base.as_ptr() as usize, 5 * UNIT);

            let end = Chunk::end(header);
            tail.as_ptr().write(Chunk { next: Link::Sentinel, size: 2 });
            assert_eq!(Chunk::end(tail), end);
        }
    }
}
