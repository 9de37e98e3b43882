use crate::{
    chunk::UNIT,
    error::ConfigError,
    kernel,
    policy::{Policy, SearchStart},
};

/// Default page size, used unless the system's is asked for.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Everything that shapes a heap's behaviour. Fixed when the heap is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How a block is chosen among the suitable ones.
    pub policy: Policy,
    /// Where each search begins.
    pub start: SearchStart,
    /// Granularity of heap growth, in bytes.
    pub page_size: usize,
    /// Keep the free list in address order and merge neighbouring free
    /// blocks on release.
    pub coalescing: bool,
}

impl Config {
    /// First-fit from the head of the list, with [`DEFAULT_PAGE_SIZE`] pages.
    pub const fn new() -> Self {
        Self {
            policy: Policy::FirstFit,
            start: SearchStart::Head,
            page_size: DEFAULT_PAGE_SIZE,
            coalescing: false,
        }
    }

    /// Like [`Config::new`] but growing by the computer's page size.
    pub fn system() -> Self {
        Self::new().with_page_size(kernel::page_size())
    }

    pub const fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn with_start(mut self, start: SearchStart) -> Self {
        self.start = start;
        self
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub const fn with_coalescing(mut self, coalescing: bool) -> Self {
        self.coalescing = coalescing;
        self
    }

    /// Checks that pages are a power of two holding a whole number of units.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size.is_power_of_two() && self.page_size % UNIT == 0 {
            Ok(())
        } else {
            Err(ConfigError::BadPageSize(self.page_size))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.policy, Policy::FirstFit);
        assert_eq!(config.start, SearchStart::Head);
        assert_eq!(config.page_size, 4096);
        assert!(!config.coalescing);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn system_page_size_is_valid() {
        assert_eq!(Config::system().validate(), Ok(()));
    }

    #[test]
    fn rejects_odd_page_sizes() {
        for size in [0, 3000, UNIT / 2] {
            assert_eq!(
                Config::new().with_page_size(size).validate(),
                Err(ConfigError::BadPageSize(size))
            );
        }
    }

    #[test]
    fn builder() {
        let config = Config::new()
            .with_policy("worst".parse().unwrap())
            .with_start("rover".parse().unwrap())
            .with_page_size(8192)
            .with_coalescing(true);

        assert_eq!(config.policy, Policy::WorstFit);
        assert_eq!(config.start, SearchStart::Rover);
        assert_eq!(config.page_size, 8192);
        assert!(config.coalescing);
    }
}
