use std::{fmt, ptr::NonNull};

use crate::chunk::{Chunk, Link};

/// Circular singly linked list of free [`Chunk`]s.
///
/// The list is anchored at a sentinel with size 0 which is always present,
/// so an empty list is just the sentinel pointing at itself. The links live
/// in the block headers themselves; the sentinel has no header, so its
/// `next` is kept here instead.
///
/// ```text
///              +-----------------------------------------------------+
///              v                                                     |
/// +------------------+     +-----------+     +-----------+     +-----------+
/// | Sentinel (0)     | --> | Free (12) | --> | Free (3)  | --> | Free (40) |
/// +------------------+     +-----------+     +-----------+     +-----------+
///                                                  ^
///                                                rover
/// ```
///
/// Allocated blocks are not members; their headers just sit in front of the
/// caller's memory until they are pushed back with [`FreeList::push_front`].
///
/// The rover always points at a member (possibly the sentinel). It is moved
/// to the successor of every block the heap uses, so a search starting there
/// picks up where the previous one left off.
pub(crate) struct FreeList {
    /// `next` of the sentinel: the first free block, or the sentinel itself.
    head: Link,
    rover: Link,
}

impl FreeList {
    /// Creates a new empty list.
    pub const fn new() -> Self {
        Self {
            head: Link::Sentinel,
            rover: Link::Sentinel,
        }
    }

    #[inline]
    pub fn head(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn rover(&self) -> Link {
        self.rover
    }

    /// Moves the rover. `to` must be a member of the list.
    #[inline]
    pub fn set_rover(&mut self, to: Link) {
        self.rover = to;
    }

    /// Successor of `link` in the list.
    #[inline]
    pub fn next_of(&self, link: Link) -> Link {
        match link {
            Link::Sentinel => self.head,
            // SAFETY: members of the list always have a valid header.
            Link::Chunk(chunk) => unsafe { chunk.as_ref().next },
        }
    }

    fn set_next(&mut self, link: Link, to: Link) {
        match link {
            Link::Sentinel => self.head = to,
            Link::Chunk(mut chunk) => unsafe { chunk.as_mut().next = to },
        }
    }

    /// Makes `chunk` the first member of the list.
    ///
    /// **SAFETY**: `chunk` must point to a valid header that is not already a
    /// member of this list.
    pub unsafe fn push_front(&mut self, mut chunk: NonNull<Chunk>) {
        unsafe { chunk.as_mut().next = self.head };
        self.head = Link::Chunk(chunk);
    }

    /// Inserts `chunk` where it belongs in ascending address order and
    /// merges it with the free blocks right before and after it, if they
    /// touch it. Returns the block that now holds `chunk`'s memory.
    ///
    /// Only meaningful when the whole list is kept in address order, i.e.
    /// when every insertion goes through here.
    ///
    /// ```text
    ///  +-------+-------+-------+            +-----------------------+
    ///  | Free  | chunk | Free  |    --->    |         Free          |
    ///  +-------+-------+-------+            +-----------------------+
    /// ```
    ///
    /// **SAFETY**: `chunk` must point to a valid header that is not already a
    /// member of this list.
    pub unsafe fn insert_sorted(&mut self, mut chunk: NonNull<Chunk>) -> NonNull<Chunk> {
        let mut prev = Link::Sentinel;
        while let Link::Chunk(next) = self.next_of(prev) {
            if next > chunk {
                break;
            }
            prev = Link::Chunk(next);
        }

        unsafe { chunk.as_mut().next = self.next_of(prev) };
        self.set_next(prev, Link::Chunk(chunk));

        unsafe {
            self.merge_with_next(chunk);

            match prev {
                Link::Chunk(prev) => self.merge_with_prev(prev, chunk),
                Link::Sentinel => chunk,
            }
        }
    }

    /// Absorbs the successor of `chunk` if it starts right where `chunk`
    /// ends.
    unsafe fn merge_with_next(&mut self, mut chunk: NonNull<Chunk>) {
        unsafe {
            let Link::Chunk(next) = chunk.as_ref().next else {
                return;
            };

            if Chunk::end(chunk) == next.as_ptr().cast_const().cast() {
                // The header of `next` becomes payload.
                chunk.as_mut().size += next.as_ref().size + 1;
                chunk.as_mut().next = next.as_ref().next;

                if self.rover == Link::Chunk(next) {
                    self.rover = Link::Chunk(chunk);
                }
            }
        }
    }

    /// Lets `prev` absorb its successor `chunk` if `prev` ends right where
    /// `chunk` starts. Returns whichever block now holds `chunk`.
    unsafe fn merge_with_prev(&mut self, mut prev: NonNull<Chunk>, chunk: NonNull<Chunk>) -> NonNull<Chunk> {
        unsafe {
            if Chunk::end(prev) != chunk.as_ptr().cast_const().cast() {
                return chunk;
            }

            prev.as_mut().size += chunk.as_ref().size + 1;
            prev.as_mut().next = chunk.as_ref().next;

            if self.rover == Link::Chunk(chunk) {
                self.rover = Link::Chunk(prev);
            }

            prev
        }
    }

    /// Removes `chunk` from the list and returns what used to follow it.
    ///
    /// The list is singly linked, so the predecessor is found by walking
    /// from the sentinel.
    ///
    /// # Panics
    ///
    /// Panics if `chunk` is not a member of the list.
    pub fn unlink(&mut self, chunk: NonNull<Chunk>) -> Link {
        let target = Link::Chunk(chunk);
        let mut prev = Link::Sentinel;

        loop {
            let next = self.next_of(prev);
            if next == target {
                break;
            }
            assert!(next != Link::Sentinel, "{chunk:p} is not in the free list");
            prev = next;
        }

        let successor = self.next_of(target);
        self.set_next(prev, successor);

        successor
    }

    /// Every member once, in list order, beginning with `start` itself.
    pub fn nodes_from(&self, start: Link) -> Nodes<'_> {
        Nodes {
            list: self,
            start,
            current: Some(start),
        }
    }

    /// Free blocks of at least `nunits` units, in list order from `start`,
    /// paired with their size.
    pub fn candidates_from(
        &self,
        start: Link,
        nunits: usize,
    ) -> impl Iterator<Item = (NonNull<Chunk>, usize)> + '_ {
        self.blocks_from(start).filter(move |&(_, size)| size >= nunits)
    }

    /// All free blocks with their size, in list order from the sentinel.
    pub fn iter(&self) -> impl Iterator<Item = (NonNull<Chunk>, usize)> + '_ {
        self.blocks_from(Link::Sentinel)
    }

    fn blocks_from(&self, start: Link) -> impl Iterator<Item = (NonNull<Chunk>, usize)> + '_ {
        self.nodes_from(start).filter_map(|link| match link {
            Link::Sentinel => None,
            Link::Chunk(chunk) => Some((chunk, unsafe { chunk.as_ref().size })),
        })
    }
}

pub(crate) struct Nodes<'a> {
    list: &'a FreeList,
    start: Link,
    current: Option<Link>,
}

impl Iterator for Nodes<'_> {
    type Item = Link;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.current?;
        let next = self.list.next_of(link);
        self.current = (next != self.start).then_some(next);

        Some(link)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Sentinel => f.write_str("sentinel"),
            Link::Chunk(chunk) => write!(f, "{chunk:p}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UNIT;

    /// Lays out headers of the given sizes back to back in `backing`.
    fn headers(backing: &mut [usize], sizes: &[usize]) -> Vec<NonNull<Chunk>> {
        let mut at = NonNull::new(backing.as_mut_ptr().cast::<u8>()).unwrap();
        let mut chunks = Vec::new();

        for &size in sizes {
            unsafe {
                let chunk = Chunk::write(at, Link::Sentinel, size);
                chunks.push(chunk);
                at = at.add((size + 1) * UNIT);
            }
        }

        chunks
    }

    /// Pushes in reverse so that the list order matches `chunks`.
    fn list_of(chunks: &[NonNull<Chunk>]) -> FreeList {
        let mut list = FreeList::new();
        for &chunk in chunks.iter().rev() {
            unsafe { list.push_front(chunk) };
        }
        list
    }

    fn sizes(list: &FreeList) -> Vec<usize> {
        list.iter().map(|(_, size)| size).collect()
    }

    #[test]
    fn new_list_is_only_the_sentinel() {
        let list = FreeList::new();

        assert_eq!(list.head(), Link::Sentinel);
        assert_eq!(list.rover(), Link::Sentinel);
        assert_eq!(list.next_of(Link::Sentinel), Link::Sentinel);
        assert_eq!(list.nodes_from(Link::Sentinel).collect::<Vec<_>>(), [Link::Sentinel]);
        assert!(list.iter().next().is_none());
    }

    #[test]
    fn push_front_is_lifo() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[1, 2, 3]);
        let mut list = FreeList::new();

        for &chunk in &chunks {
            unsafe { list.push_front(chunk) };
        }

        assert_eq!(sizes(&list), [3, 2, 1]);
    }

    #[test]
    fn traversal_wraps_around_once() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[5, 2, 9]);
        let list = list_of(&chunks);

        let nodes: Vec<_> = list.nodes_from(Link::Chunk(chunks[1])).collect();

        assert_eq!(
            nodes,
            [
                Link::Chunk(chunks[1]),
                Link::Chunk(chunks[2]),
                Link::Sentinel,
                Link::Chunk(chunks[0]),
            ]
        );
    }

    #[test]
    fn candidates_skip_small_blocks_and_sentinel() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[5, 2, 9, 3]);
        let list = list_of(&chunks);

        let found: Vec<_> = list.candidates_from(Link::Chunk(chunks[2]), 3).collect();

        assert_eq!(found, [(chunks[2], 9), (chunks[3], 3), (chunks[0], 5)]);
    }

    #[test]
    fn unlink_repairs_predecessor() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[5, 2, 9]);
        let mut list = list_of(&chunks);

        assert_eq!(list.unlink(chunks[1]), Link::Chunk(chunks[2]));
        assert_eq!(sizes(&list), [5, 9]);

        assert_eq!(list.unlink(chunks[2]), Link::Sentinel);
        assert_eq!(sizes(&list), [5]);

        assert_eq!(list.unlink(chunks[0]), Link::Sentinel);
        assert_eq!(list.head(), Link::Sentinel);
    }

    #[test]
    fn insert_sorted_keeps_address_order() {
        let mut backing = [0usize; 64];
        // Gaps of one unit keep the blocks from touching.
        let chunks = headers(&mut backing, &[3, 0, 4, 0, 5]);
        let mut list = FreeList::new();

        for i in [4, 0, 2] {
            let holder = unsafe { list.insert_sorted(chunks[i]) };
            assert_eq!(holder, chunks[i]);
        }

        let order: Vec<_> = list.iter().map(|(chunk, _)| chunk).collect();
        assert_eq!(order, [chunks[0], chunks[2], chunks[4]]);
    }

    #[test]
    fn insert_sorted_merges_both_neighbours() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[3, 2, 4]);
        let mut list = FreeList::new();

        unsafe {
            list.insert_sorted(chunks[2]);
            list.set_rover(Link::Chunk(chunks[2]));
            list.insert_sorted(chunks[0]);
            assert_eq!(sizes(&list), [3, 4]);

            let holder = list.insert_sorted(chunks[1]);
            assert_eq!(holder, chunks[0]);
        }

        // Two absorbed headers become payload.
        assert_eq!(sizes(&list), [3 + 2 + 4 + 2]);
        assert_eq!(list.rover(), Link::Chunk(chunks[0]));
    }

    #[test]
    fn insert_sorted_merges_with_predecessor_only() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[3, 2, 0, 4]);
        let mut list = FreeList::new();

        unsafe {
            list.insert_sorted(chunks[0]);
            list.insert_sorted(chunks[3]);
            let holder = list.insert_sorted(chunks[1]);
            assert_eq!(holder, chunks[0]);
        }

        assert_eq!(sizes(&list), [3 + 2 + 1, 4]);
    }

    #[test]
    #[should_panic(expected = "not in the free list")]
    fn unlink_of_stranger_panics() {
        let mut backing = [0usize; 64];
        let chunks = headers(&mut backing, &[5, 2]);
        let mut list = list_of(&chunks[..1]);

        list.unlink(chunks[1]);
    }
}
