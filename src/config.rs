use crate::api::compare::Comparator;
use crate::api::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 4096;
pub const MIN_PAGE_SIZE: u32 = 256;
pub const MAX_PAGE_SIZE: u32 = 65536;
pub const DEFAULT_CACHE_PAGES: usize = 1024;
const MIN_CACHE_PAGES: usize = 8;

/// Options applied when a database is opened.
///
/// The page size and comparator are fixed at creation time and recorded in the file:
/// reopening uses the stored page size, while a comparator different from the stored one
/// is rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    /// Size of a page in bytes, a power of two between 256 and 65536.
    pub page_size: u32,
    /// Number of pages kept in memory. Pages modified by an active transaction are kept
    /// regardless, outside of a transaction exceeding this triggers a flush.
    pub cache_pages: usize,
    pub comparator: Comparator,
    /// Call fsync when flushing. Turning it off trades crash safety for speed.
    pub sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            comparator: Comparator::default(),
            sync: true,
        }
    }
}

impl Config {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_page_size(self.page_size)?;
        if self.cache_pages < MIN_CACHE_PAGES {
            return Err(Error::Other(format!(
                "Cache too small: {} pages (min {})",
                self.cache_pages, MIN_CACHE_PAGES
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_page_size(page_size: u32) -> Result<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) || !page_size.is_power_of_two() {
        return Err(Error::Other(format!("Invalid page size: {}", page_size)));
    }
    Ok(())
}
