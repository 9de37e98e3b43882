use std::{error, fmt};

/// An allocation request could not be served.
///
/// The heap is left exactly as it was before the request, so later calls
/// (for example after a `release`) may still succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The page source refused to grow the heap by `bytes`.
    OutOfMemory { bytes: usize },
    /// The request is too large to even compute its size in pages.
    TooLarge { requested: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory { bytes } => {
                write!(f, "out of memory: could not extend the heap by {bytes} bytes")
            }
            AllocError::TooLarge { requested } => {
                write!(f, "allocation of {requested} bytes exceeds the address space")
            }
        }
    }
}

impl error::Error for AllocError {}

/// Invalid heap configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownPolicy(String),
    UnknownSearchStart(String),
    /// Pages must be a power of two and hold a whole number of units.
    BadPageSize(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPolicy(policy) => {
                write!(f, "invalid search policy: {policy} (expected best, first or worst)")
            }
            ConfigError::UnknownSearchStart(start) => {
                write!(f, "invalid search starting location: {start} (expected head or rover)")
            }
            ConfigError::BadPageSize(size) => {
                write!(
                    f,
                    "invalid page size: {size} (must be a power of two and a multiple of {})",
                    crate::UNIT
                )
            }
        }
    }
}

impl error::Error for ConfigError {}

/// Inconsistency found by [`Heap::validate`](crate::Heap::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// A free block other than the sentinel records no payload.
    EmptyBlock { at: usize },
    /// The rover is not a member of the free list.
    RoverLost,
    /// Walking the list never came back to the sentinel.
    Cycle,
    /// The free list holds more bytes than were ever obtained.
    Overcommitted { free: usize, obtained: usize },
    /// With coalescing, a block does not come after its predecessor.
    OutOfOrder { at: usize },
    /// With coalescing, a block runs into the one after it.
    Overlap { at: usize },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::EmptyBlock { at } => write!(f, "free block at {at:#x} has size 0"),
            Corruption::RoverLost => f.write_str("rover is not in the free list"),
            Corruption::Cycle => f.write_str("free list does not return to the sentinel"),
            Corruption::Overcommitted { free, obtained } => write!(
                f,
                "free list holds {free} bytes but only {obtained} were obtained"
            ),
            Corruption::OutOfOrder { at } => {
                write!(f, "free block at {at:#x} is out of address order")
            }
            Corruption::Overlap { at } => {
                write!(f, "free block at {at:#x} overlaps its successor")
            }
        }
    }
}

impl error::Error for Corruption {}
