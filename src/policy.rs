//! Block selection.
//!
//! The heap walks its free list and feeds every block that is large enough
//! for the request to a [`Strategy`], which decides which one to use. The
//! strategies never see blocks that are too small, so they only have to
//! trade search cost against fragmentation.

use std::{fmt, str::FromStr};

use crate::error::ConfigError;

/// A block the heap could use: some handle to it and its size in units.
pub type Candidate<T> = (T, usize);

/// Picks one block out of the suitable ones, given in traversal order.
pub trait Strategy {
    fn select<T, I>(&self, candidates: I) -> Option<Candidate<T>>
    where
        I: IntoIterator<Item = Candidate<T>>;
}

/// Takes the first suitable block and stops looking.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFit;

/// Scans the whole list for the smallest suitable block.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFit;

/// Scans the whole list for the largest suitable block.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorstFit;

impl Strategy for FirstFit {
    fn select<T, I>(&self, candidates: I) -> Option<Candidate<T>>
    where
        I: IntoIterator<Item = Candidate<T>>,
    {
        candidates.into_iter().next()
    }
}

impl Strategy for BestFit {
    fn select<T, I>(&self, candidates: I) -> Option<Candidate<T>>
    where
        I: IntoIterator<Item = Candidate<T>>,
    {
        // Strict comparison so that ties keep the first one found.
        candidates
            .into_iter()
            .reduce(|best, next| if next.1 < best.1 { next } else { best })
    }
}

impl Strategy for WorstFit {
    fn select<T, I>(&self, candidates: I) -> Option<Candidate<T>>
    where
        I: IntoIterator<Item = Candidate<T>>,
    {
        candidates
            .into_iter()
            .reduce(|worst, next| if next.1 > worst.1 { next } else { worst })
    }
}

/// The strategy a heap is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    #[default]
    FirstFit,
    BestFit,
    WorstFit,
}

impl Strategy for Policy {
    fn select<T, I>(&self, candidates: I) -> Option<Candidate<T>>
    where
        I: IntoIterator<Item = Candidate<T>>,
    {
        match self {
            Policy::FirstFit => FirstFit.select(candidates),
            Policy::BestFit => BestFit.select(candidates),
            Policy::WorstFit => WorstFit.select(candidates),
        }
    }
}

impl FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Policy::FirstFit),
            "best" => Ok(Policy::BestFit),
            "worst" => Ok(Policy::WorstFit),
            other => Err(ConfigError::UnknownPolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::FirstFit => "first-fit",
            Policy::BestFit => "best-fit",
            Policy::WorstFit => "worst-fit",
        })
    }
}

/// Where a search begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchStart {
    /// At the head of the free list, so recently freed blocks come first.
    #[default]
    Head,
    /// At the rover, the block following the one used last.
    Rover,
}

impl FromStr for SearchStart {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(SearchStart::Head),
            "rover" => Ok(SearchStart::Rover),
            other => Err(ConfigError::UnknownSearchStart(other.to_owned())),
        }
    }
}

impl fmt::Display for SearchStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchStart::Head => "head",
            SearchStart::Rover => "rover",
        })
    }
}
