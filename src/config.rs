//! Arena configuration
//!
//! Design: Sizes are fixed for the arena's lifetime. Validation happens here,
//! before any memory is reserved, so a bad config never leaks a mapping.

use crate::arena::PageGeometry;
use crate::error::ArenaError;

/// Default allocation granularity (64 KiB cache pages)
pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

/// Arena configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Bytes to reserve from the backend
    pub total_size: usize,
    /// Allocation granularity in bytes (power of two)
    pub page_size: usize,
}

impl ArenaConfig {
    /// Config for `total_size` bytes with the default page size
    pub const fn new(total_size: usize) -> Self {
        Self {
            total_size,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Create config from environment variables
    ///
    /// `PAGE_ARENA_SIZE` and `PAGE_ARENA_PAGE_SIZE` accept a byte count with an
    /// optional `K`, `M` or `G` suffix. Unparseable values are ignored.
    pub fn from_env(default_total: usize) -> Self {
        let mut config = Self::new(default_total);

        if let Some(size) = env_bytes("PAGE_ARENA_SIZE") {
            config.total_size = size;
        }
        if let Some(page) = env_bytes("PAGE_ARENA_PAGE_SIZE") {
            config.page_size = page;
        }

        config
    }

    /// Check the config and derive the page geometry
    pub fn validate(&self) -> Result<PageGeometry, ArenaError> {
        if self.total_size == 0 {
            return Err(ArenaError::ZeroSize);
        }
        if !self.page_size.is_power_of_two() {
            return Err(ArenaError::InvalidConfig {
                reason: "page size must be a power of two",
            });
        }

        let pages = self.total_size / self.page_size;
        if pages == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "total size is smaller than one page",
            });
        }
        let num_pages = u32::try_from(pages).map_err(|_| ArenaError::InvalidConfig {
            reason: "page count does not fit in 32 bits",
        })?;

        Ok(PageGeometry::new(self.total_size, self.page_size, num_pages))
    }
}

fn env_bytes(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| parse_bytes(&v))
}

/// Parse `"64K"`, `"512M"`, `"2g"` or a plain decimal byte count
pub(crate) fn parse_bytes(value: &str) -> Option<usize> {
    let value = value.trim();
    let (digits, shift) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 10),
        b'm' | b'M' => (&value[..value.len() - 1], 20),
        b'g' | b'G' => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };

    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(1usize << shift)
}
