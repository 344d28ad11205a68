use crate::api::compare::Comparator;
use crate::api::error::Result;
use crate::api::page::{Kind, Page};

/// Fixed-size page storage the ordered index is built on.
pub(crate) trait Pager {
    type Page: Page;

    /// Read access to the page, loading it into the cache if necessary.
    fn page(&mut self, id: u32) -> Result<&Self::Page>;

    /// Write access to the page. The page is marked dirty and becomes durable on `flush`.
    fn page_mut(&mut self, id: u32) -> Result<&mut Self::Page>;

    /// Reserve an id for a fresh empty page of a given kind. Such id will never be returned
    /// again by `allocate` until freed.
    fn allocate(&mut self, kind: Kind) -> Result<u32>;

    /// Return the page to the free list, making the id available for `allocate`.
    fn free(&mut self, id: u32);

    /// Make all changes durable.
    fn flush(&mut self) -> Result<()>;

    fn root(&self) -> u32;
    fn page_bytes(&self) -> u32;
    fn comparator(&self) -> Comparator;

    /// Number of records stored in the tree.
    fn count(&self) -> u64;
    fn set_count(&mut self, count: u64);
}
