use crate::error::{Error, Result};

/// Static description of the data cache. Sizes are counted in array elements, not bytes.
///
/// Only the line size takes part in cost estimation today; total size and associativity are
/// carried so that a reuse-distance model can be layered on later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheModel {
    line_size: u32,
    cache_size: u32,
    associativity: u32,
}

impl CacheModel {
    pub const DEFAULT_LINE_SIZE: u32 = 4;
    pub const DEFAULT_CACHE_SIZE: u32 = 8192;
    pub const DEFAULT_ASSOCIATIVITY: u32 = 8;

    pub fn new(line_size: u32, cache_size: u32, associativity: u32) -> Result<Self> {
        if line_size == 0 {
            return Err(Error::ZeroLineSize);
        }

        Ok(Self {
            line_size,
            cache_size,
            associativity,
        })
    }

    /// Default cache geometry with a different line size.
    pub fn with_line_size(line_size: u32) -> Result<Self> {
        Self::new(
            line_size,
            Self::DEFAULT_CACHE_SIZE,
            Self::DEFAULT_ASSOCIATIVITY,
        )
    }

    /// Never zero.
    pub fn line_size(&self) -> u32 {
        self.line_size
    }

    pub fn cache_size(&self) -> u32 {
        self.cache_size
    }

    pub fn associativity(&self) -> u32 {
        self.associativity
    }

    /// Number of lines in the whole cache.
    pub fn num_lines(&self) -> u32 {
        self.cache_size / self.line_size
    }

    /// Number of sets, or 0 for a fully associative cache described with associativity 0.
    pub fn num_sets(&self) -> u32 {
        match self.associativity {
            0 => 0,
            ways => self.num_lines() / ways,
        }
    }
}

impl Default for CacheModel {
    fn default() -> Self {
        Self {
            line_size: Self::DEFAULT_LINE_SIZE,
            cache_size: Self::DEFAULT_CACHE_SIZE,
            associativity: Self::DEFAULT_ASSOCIATIVITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let cache = CacheModel::default();
        assert_eq!(cache.line_size(), 4);
        assert_eq!(cache.num_lines(), 2048);
        assert_eq!(cache.num_sets(), 256);
    }

    #[test]
    fn zero_line_size_is_rejected() {
        assert_eq!(CacheModel::with_line_size(0), Err(Error::ZeroLineSize));
        assert_eq!(CacheModel::with_line_size(16).unwrap().line_size(), 16);
    }
}
