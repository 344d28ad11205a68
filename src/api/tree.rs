use crate::api::error::Result;

/// Behaviour of a put when a record with the same key is already stored.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum PutMode {
    /// Replace the stored value.
    #[default]
    Overwrite,
    /// Leave the stored value untouched and report that nothing was written.
    Keep,
}

/// Ordered index over the pages of a store.
pub(crate) trait Tree {
    fn lookup(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check that a record exists without reading its value.
    fn contains(&mut self, key: &[u8]) -> Result<bool>;

    /// Returns true if the record was written (always the case for `PutMode::Overwrite`).
    fn insert(&mut self, key: &[u8], val: &[u8], mode: PutMode) -> Result<bool>;

    /// Returns true if the record was found (and removed).
    fn remove(&mut self, key: &[u8]) -> Result<bool>;

    /// Get lowest/smallest key stored in the tree, or none if tree is empty.
    fn first(&mut self) -> Result<Option<Vec<u8>>>;

    /// Get highest/biggest key stored in the tree, or none if tree is empty.
    fn last(&mut self) -> Result<Option<Vec<u8>>>;

    /// Smallest key greater or equal to the given one (strictly greater if `strict`).
    fn ceil(&mut self, key: &[u8], strict: bool) -> Result<Option<Vec<u8>>>;

    /// Biggest key lesser or equal to the given one (strictly lesser if `strict`).
    fn floor(&mut self, key: &[u8], strict: bool) -> Result<Option<Vec<u8>>>;

    /// Rebuild the tree from scratch with fully packed pages.
    fn optimize(&mut self) -> Result<()>;
}
