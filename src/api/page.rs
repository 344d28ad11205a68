use crate::api::compare::Comparator;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Slot {
    pub(crate) offset: u32,
    pub(crate) klen: u32,
    pub(crate) vlen: u32,
    pub(crate) page: u32, // child page (node), first overflow page (leaf) or next page (overflow/free)
}

impl Slot {
    pub(crate) fn new(offset: u32, klen: u32, vlen: u32, page: u32) -> Self {
        Self {
            offset,
            klen,
            vlen,
            page,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Kind {
    Leaf,
    Node,
    Overflow,
    Free,
}

impl Kind {
    pub(crate) fn tag(&self) -> u16 {
        match self {
            Kind::Leaf => 1,
            Kind::Node => 2,
            Kind::Overflow => 3,
            Kind::Free => 4,
        }
    }

    pub(crate) fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Kind::Leaf),
            2 => Some(Kind::Node),
            3 => Some(Kind::Overflow),
            4 => Some(Kind::Free),
            _ => None,
        }
    }
}

/// A key, a value and a page reference: the unit stored in a slot.
pub(crate) type Entry = (Vec<u8>, Vec<u8>, u32);

pub(crate) trait Page: AsRef<[u8]> + AsMut<[u8]> {
    /// Zero-filled buffer of given capacity, to be filled by reading from the disk.
    fn reserve(cap: u32) -> Self;

    /// Empty page of given kind.
    fn create(id: u32, cap: u32, kind: Kind) -> Self;

    fn id(&self) -> u32;
    fn cap(&self) -> u32;
    fn len(&self) -> u32;
    fn kind(&self) -> Option<Kind>;

    fn slot(&self, idx: u32) -> Option<Slot>;

    fn key(&self, idx: u32) -> &[u8];
    fn val(&self, idx: u32) -> &[u8];

    fn max(&self) -> &[u8];

    /// Locate a key: `Ok(idx)` for exact match, `Err(idx)` for the insertion point.
    fn search(&self, key: &[u8], cmp: Comparator) -> Result<u32, u32>;

    /// Find a slot with exact match to a given key (if any).
    fn find(&self, key: &[u8], cmp: Comparator) -> Option<u32>;

    /// Find a slot with the smallest key greater or equal to a given key.
    fn ceil(&self, key: &[u8], cmp: Comparator) -> Option<u32>;

    /// Get total number of unoccupied bytes in the page.
    /// This does not mean payload of same size can fit the page.
    fn free(&self) -> u32;

    /// Check if payload (key and value) of given size can fit the page,
    /// taking into account necessary housekeeping overhead.
    fn fits(&self, len: u32) -> bool;

    /// Put a key-value pair into the page, replacing an existing entry with the same key.
    /// Returns slot index if operation was successful.
    fn put_val(&mut self, key: &[u8], val: &[u8], page: u32, cmp: Comparator) -> Option<u32>;

    /// Append an entry after the last slot, caller is responsible for the order of keys.
    fn push(&mut self, key: &[u8], val: &[u8], page: u32) -> Option<u32>;

    /// Remove the slot of a given index.
    /// Automatic defragmentation is performed then to maximize available capacity.
    fn remove(&mut self, idx: u32);

    fn copy(&self) -> Vec<Entry>;

    /// Drop all entries and re-tag the page.
    fn clear(&mut self, kind: Kind);

    /// Store the checksum of the page content in the page header.
    fn seal(&mut self);

    /// Verify the magic, kind and checksum stored in the page header.
    fn verify(&self) -> bool;
}
