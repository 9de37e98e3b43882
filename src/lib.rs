//! # chunkheap - a free-list heap on top of page-sized heap growth
//!
//! This crate implements the classic "chunk" allocator: memory is obtained
//! from the operating system a few pages at a time and never given back,
//! and carved into blocks that are tracked in a circular free list.
//!
//! ```text
//!   Program Memory Layout:
//!
//!   High Address +---------------------+
//!                |       Stack         | | grows down
//!                |         |           |
//!                |         v           |
//!                |                     |
//!                |         ^           |
//!                |         |           |
//!                |       Heap          | | grows up, one or more pages at a time
//!                +---------------------+ <- Program Break
//!                |   Uninitialized     |
//!                |       Data          |
//!                +---------------------+
//!                |   Initialized       |
//!                |       Data          |
//!                +---------------------+
//!                |       Text          |
//!   Low Address  +---------------------+
//! ```
//!
//! Everything is measured in *units*, the size of one block header
//! ([`UNIT`]). Each block, free or allocated, is a header unit followed by a
//! whole number of payload units:
//!
//! ```text
//! +------+----------------+------+-----------+------+----------------------+
//! | hdr  |  free payload  | hdr  |  in use   | hdr  |     free payload     |
//! +------+----------------+------+-----------+------+----------------------+
//!    |                                           ^
//!    +-------------------------------------------+
//!                     free list
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   chunkheap
//!   ├── kernel    - PageSource trait, OS sources (sbrk, mmap, VirtualAlloc)
//!   ├── arena     - bounded in-memory PageSource
//!   ├── chunk     - block header and header/payload arithmetic
//!   ├── freelist  - circular free list with sentinel and rover
//!   ├── policy    - first/best/worst-fit search strategies
//!   ├── heap      - the allocator itself
//!   ├── stats     - statistics and free-list dump
//!   ├── config    - heap configuration
//!   ├── error     - error types
//!   └── global    - GlobalAlloc wrapper
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use chunkheap::{Arena, Config, Heap, Policy};
//!
//! let config = Config::new().with_policy(Policy::BestFit).with_coalescing(true);
//! let mut heap = Heap::new(Arena::new(16, config.page_size), config);
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0, 100);
//!     heap.release(ptr);
//! }
//!
//! // The released block merged back into the rest of its page.
//! let stats = heap.stats();
//! assert_eq!(stats.item_count, 1);
//! assert!(stats.is_fully_released());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded**: a [`Heap`] has no synchronization of its own;
//!   [`LockedHeap`] adds a lock around it.
//! - **Coalescing is opt-in**: by default released blocks are not merged
//!   with their neighbours, so the heap fragments over time. See
//!   [`Config::coalescing`].
//! - **No shrinking**: memory is never handed back to the OS.
//! - **No misuse detection**: double frees and foreign pointers are
//!   undefined behaviour.

mod arena;
mod chunk;
mod config;
mod error;
mod freelist;
mod global;
mod heap;
mod kernel;
mod policy;
mod stats;
mod utils;

pub use arena::Arena;
pub use chunk::UNIT;
pub use config::{Config, DEFAULT_PAGE_SIZE};
pub use error::{AllocError, ConfigError, Corruption};
pub use global::LockedHeap;
pub use heap::Heap;
pub use kernel::{PageSource, page_size};
pub use policy::{BestFit, Candidate, FirstFit, Policy, SearchStart, Strategy, WorstFit};
pub use stats::{Dump, HeapStats};

#[cfg(unix)]
pub use kernel::{Mmap, Sbrk};

#[cfg(windows)]
pub use kernel::VirtualMemory;
