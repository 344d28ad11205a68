//! B+tree over a page store.
//!
//! Node entries are `(max key of the child, child id)`, leaf entries are either
//! `(key, value, 0)` or, for values too large to be stored inline, `(key, total length,
//! first overflow page)`. Modifications work on copies of page entries and return the
//! references that replace the page in its parent: none (page became empty), one, or
//! two (page was split).

use crate::api::compare::Comparator;
use crate::api::error::{Error, Result};
use crate::api::page::{Entry, Kind, Page};
use crate::api::pager::Pager;
use crate::api::tree::{PutMode, Tree};
use crate::disk::block::{HEAD, SLOT};
use log::{debug, trace};
use std::collections::HashSet;

type Ref = (Vec<u8>, u32);

const MAX_DEPTH: usize = 32;

fn payload<S: Pager>(store: &S) -> u32 {
    store.page_bytes() - HEAD as u32
}

/// Largest entry (key and value) stored inline, bigger values go to overflow pages.
fn inline_limit<S: Pager>(store: &S) -> u32 {
    payload(store) / 4 - SLOT as u32
}

/// Longest key accepted: an overflow reference (4 bytes of length) must still fit inline.
pub(crate) fn max_key<S: Pager>(store: &S) -> u32 {
    inline_limit(store) - 4
}

fn entry_size(entry: &Entry) -> u32 {
    (entry.0.len() + entry.1.len() + SLOT) as u32
}

fn size(entries: &[Entry]) -> u32 {
    entries.iter().map(entry_size).sum()
}

fn max_of(entries: &[Entry]) -> Vec<u8> {
    entries.last().map(|e| e.0.clone()).unwrap_or_default()
}

/// Split entries into two runs of roughly equal size in bytes.
fn halve(mut entries: Vec<Entry>) -> (Vec<Entry>, Vec<Entry>) {
    let total = size(&entries);
    let mut acc = 0;
    let mut at = 0;
    for entry in entries.iter() {
        if acc >= total / 2 {
            break;
        }
        acc += entry_size(entry);
        at += 1;
    }
    let at = at.clamp(1, entries.len().saturating_sub(1).max(1));
    let hi = entries.split_off(at);
    (entries, hi)
}

fn unexpected(id: u32, kind: Option<Kind>) -> Error {
    Error::Corruption(id, format!("Unexpected page kind: {:?}", kind))
}

fn too_deep(id: u32) -> Error {
    Error::Corruption(id, "Tree depth limit exceeded".to_string())
}

fn child<P: Page>(page: &P, idx: u32) -> Result<u32> {
    match page.slot(idx) {
        Some(slot) if slot.page != 0 => Ok(slot.page),
        _ => Err(Error::Corruption(
            page.id(),
            format!("Missing child reference at slot {}", idx),
        )),
    }
}

/// First slot with a key greater or equal to the given one (strictly greater if `strict`).
fn upper<P: Page>(page: &P, key: &[u8], cmp: Comparator, strict: bool) -> u32 {
    match page.search(key, cmp) {
        Ok(idx) if strict => idx + 1,
        Ok(idx) | Err(idx) => idx,
    }
}

fn read<S: Pager>(store: &mut S, id: u32, depth: usize) -> Result<(Kind, Vec<Entry>)> {
    if depth > MAX_DEPTH {
        return Err(too_deep(id));
    }
    let page = store.page(id)?;
    match page.kind() {
        Some(kind @ Kind::Leaf) | Some(kind @ Kind::Node) => Ok((kind, page.copy())),
        kind => Err(unexpected(id, kind)),
    }
}

fn write<S: Pager>(store: &mut S, id: u32, kind: Kind, entries: &[Entry]) -> Result<()> {
    let page = store.page_mut(id)?;
    page.clear(kind);
    for (key, val, next) in entries {
        page.push(key, val, *next)
            .ok_or_else(|| Error::Corruption(id, "Page overflow".to_string()))?;
    }
    Ok(())
}

/// Write entries to the page, splitting it if they don't fit.
fn rewrite<S: Pager>(
    store: &mut S,
    id: u32,
    kind: Kind,
    entries: Vec<Entry>,
) -> Result<Vec<Ref>> {
    if entries.is_empty() {
        write(store, id, kind, &[])?;
        return Ok(vec![]);
    }
    if size(&entries) <= payload(store) {
        write(store, id, kind, &entries)?;
        return Ok(vec![(max_of(&entries), id)]);
    }

    let (lo, hi) = halve(entries);
    let (lo_max, hi_max) = (max_of(&lo), max_of(&hi));

    if id == store.root() {
        // Root keeps its id: both halves move out and the root becomes a node above them.
        let l = store.allocate(kind)?;
        let r = store.allocate(kind)?;
        write(store, l, kind, &lo)?;
        write(store, r, kind, &hi)?;
        let refs = vec![(lo_max, vec![], l), (hi_max.clone(), vec![], r)];
        write(store, id, Kind::Node, &refs)?;
        debug!("Root split: children {} and {}", l, r);
        return Ok(vec![(hi_max, id)]);
    }

    let l = store.allocate(kind)?;
    write(store, l, kind, &lo)?;
    write(store, id, kind, &hi)?;
    trace!("Page {} split: lower half moved to {}", id, l);
    Ok(vec![(lo_max, l), (hi_max, id)])
}

fn put<S: Pager>(
    store: &mut S,
    id: u32,
    key: &[u8],
    val: &[u8],
    next: u32,
    depth: usize,
) -> Result<Vec<Ref>> {
    if depth > MAX_DEPTH {
        return Err(too_deep(id));
    }
    let cmp = store.comparator();
    let kind = store.page(id)?.kind();

    match kind {
        Some(Kind::Leaf) => {
            let page = store.page_mut(id)?;
            if page.put_val(key, val, next, cmp).is_some() {
                return Ok(vec![(page.max().to_vec(), id)]);
            }
            let mut entries = page.copy();
            let entry = (key.to_vec(), val.to_vec(), next);
            match entries.binary_search_by(|e| cmp.compare(&e.0, key)) {
                Ok(idx) => entries[idx] = entry,
                Err(idx) => entries.insert(idx, entry),
            }
            rewrite(store, id, Kind::Leaf, entries)
        }
        Some(Kind::Node) => {
            let (idx, target) = {
                let page = store.page(id)?;
                let len = page.len();
                if len == 0 {
                    return Err(Error::Corruption(id, "Empty node".to_string()));
                }
                let idx = page.ceil(key, cmp).unwrap_or(len - 1);
                (idx as usize, child(page, idx)?)
            };

            let refs = put(store, target, key, val, next, depth + 1)?;
            let mut entries = store.page(id)?.copy();
            if refs.len() == 1 && refs[0].1 == target && refs[0].0 == entries[idx].0 {
                return Ok(vec![(max_of(&entries), id)]);
            }
            entries.splice(
                idx..=idx,
                refs.into_iter().map(|(key, page)| (key, vec![], page)),
            );
            rewrite(store, id, Kind::Node, entries)
        }
        kind => Err(unexpected(id, kind)),
    }
}

fn sibling<S: Pager>(store: &mut S, id: u32, kind: Kind, depth: usize) -> Result<Vec<Entry>> {
    let (found, entries) = read(store, id, depth)?;
    if found != kind {
        return Err(unexpected(id, Some(found)));
    }
    Ok(entries)
}

/// Merge an underfilled child with its sibling, or even out their entries when both don't
/// fit into one page.
fn rebalance<S: Pager>(
    store: &mut S,
    entries: &mut Vec<Entry>,
    idx: usize,
    depth: usize,
) -> Result<()> {
    if entries.len() < 2 || idx >= entries.len() {
        return Ok(());
    }
    let payload = payload(store);
    let (kind, target) = read(store, entries[idx].2, depth)?;
    if size(&target) >= payload / 4 {
        return Ok(());
    }

    let (lo, hi) = if idx + 1 < entries.len() {
        (idx, idx + 1)
    } else {
        (idx - 1, idx)
    };
    let (lo_id, hi_id) = (entries[lo].2, entries[hi].2);
    let all = if lo == idx {
        let mut all = target;
        all.extend(sibling(store, hi_id, kind, depth)?);
        all
    } else {
        let mut all = sibling(store, lo_id, kind, depth)?;
        all.extend(target);
        all
    };

    if size(&all) <= payload {
        write(store, hi_id, kind, &all)?;
        store.free(lo_id);
        entries.remove(lo);
        trace!("Page {} merged into {}", lo_id, hi_id);
    } else {
        let (l, h) = halve(all);
        write(store, lo_id, kind, &l)?;
        write(store, hi_id, kind, &h)?;
        entries[lo].0 = max_of(&l);
        trace!("Entries redistributed between pages {} and {}", lo_id, hi_id);
    }
    Ok(())
}

/// None if the key was not found, otherwise references replacing the page in its parent.
fn delete<S: Pager>(
    store: &mut S,
    id: u32,
    key: &[u8],
    depth: usize,
) -> Result<Option<Vec<Ref>>> {
    if depth > MAX_DEPTH {
        return Err(too_deep(id));
    }
    let cmp = store.comparator();
    let (kind, found) = {
        let page = store.page(id)?;
        let kind = page.kind();
        let found = match kind {
            Some(Kind::Leaf) => page.find(key, cmp),
            _ => page.ceil(key, cmp),
        };
        (kind, found)
    };
    let idx = match found {
        Some(idx) => idx,
        None => return Ok(None),
    };

    match kind {
        Some(Kind::Leaf) => {
            let slot = store.page(id)?.slot(idx);
            if let Some(first) = slot.map(|s| s.page).filter(|page| *page != 0) {
                free_chain(store, first)?;
            }
            let page = store.page_mut(id)?;
            page.remove(idx);
            if page.len() == 0 {
                Ok(Some(vec![]))
            } else {
                Ok(Some(vec![(page.max().to_vec(), id)]))
            }
        }
        Some(Kind::Node) => {
            let target = child(store.page(id)?, idx)?;
            let refs = match delete(store, target, key, depth + 1)? {
                Some(refs) => refs,
                None => return Ok(None),
            };
            if refs.is_empty() {
                store.free(target);
            }

            let idx = idx as usize;
            let count = refs.len();
            let (_, mut entries) = read(store, id, depth)?;
            entries.splice(
                idx..=idx,
                refs.into_iter().map(|(key, page)| (key, vec![], page)),
            );
            if count == 1 {
                rebalance(store, &mut entries, idx, depth + 1)?;
            }
            Ok(Some(rewrite(store, id, Kind::Node, entries)?))
        }
        kind => Err(unexpected(id, kind)),
    }
}

/// Pull the only child of the root node up into the root, until the root has more children
/// or is a leaf.
fn collapse<S: Pager>(store: &mut S) -> Result<()> {
    let root = store.root();
    for depth in 0..MAX_DEPTH {
        let (kind, entries) = read(store, root, depth)?;
        if kind != Kind::Node {
            return Ok(());
        }
        match entries.len() {
            0 => {
                write(store, root, Kind::Leaf, &[])?;
                return Ok(());
            }
            1 => {
                let only = entries[0].2;
                let (kind, entries) = read(store, only, depth + 1)?;
                write(store, root, kind, &entries)?;
                store.free(only);
                debug!("Root collapsed: page {} pulled up", only);
            }
            _ => return Ok(()),
        }
    }
    Err(too_deep(root))
}

fn write_chain<S: Pager>(store: &mut S, val: &[u8]) -> Result<u32> {
    let chunk = (payload(store) - SLOT as u32) as usize;
    let ids = val
        .chunks(chunk)
        .map(|_| store.allocate(Kind::Overflow))
        .collect::<Result<Vec<_>>>()?;
    for (i, part) in val.chunks(chunk).enumerate() {
        let next = ids.get(i + 1).cloned().unwrap_or_default();
        store
            .page_mut(ids[i])?
            .push(&[], part, next)
            .ok_or_else(|| Error::Corruption(ids[i], "Overflow page too small".to_string()))?;
    }
    trace!("Value of {} bytes stored in {} overflow page(s)", val.len(), ids.len());
    Ok(ids.first().cloned().unwrap_or_default())
}

fn chain<S: Pager>(store: &mut S, first: u32, mut visit: impl FnMut(&[u8])) -> Result<Vec<u32>> {
    // Keeps track of visited pages to avoid possible circular reference navigation.
    let mut seen = HashSet::with_capacity(8);
    let mut ids = Vec::with_capacity(8);
    let mut id = first;
    while id != 0 {
        if !seen.insert(id) {
            return Err(Error::Corruption(id, "Overflow chain contains a cycle".to_string()));
        }
        let page = store.page(id)?;
        if page.kind() != Some(Kind::Overflow) {
            return Err(unexpected(id, page.kind()));
        }
        visit(page.val(0));
        ids.push(id);
        id = page.slot(0).map(|slot| slot.page).unwrap_or_default();
    }
    Ok(ids)
}

fn read_chain<S: Pager>(store: &mut S, first: u32, len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    chain(store, first, |chunk| out.extend_from_slice(chunk))?;
    if out.len() != len {
        return Err(Error::Corruption(
            first,
            format!("Overflow chain holds {} bytes, expected {}", out.len(), len),
        ));
    }
    Ok(out)
}

fn free_chain<S: Pager>(store: &mut S, first: u32) -> Result<()> {
    for id in chain(store, first, |_| ())? {
        store.free(id);
    }
    Ok(())
}

/// Raw leaf entry (value and overflow reference) for the key, if present.
fn locate<S: Pager>(store: &mut S, key: &[u8]) -> Result<Option<(Vec<u8>, u32)>> {
    let cmp = store.comparator();
    // Keeps track of visited pages to avoid possible circular reference navigation.
    let mut seen = HashSet::with_capacity(8);
    let mut id = store.root();
    loop {
        if !seen.insert(id) {
            return Err(Error::Corruption(id, "Circular page reference".to_string()));
        }
        let page = store.page(id)?;
        match page.kind() {
            Some(Kind::Leaf) => {
                return Ok(page.find(key, cmp).map(|idx| {
                    let next = page.slot(idx).map(|s| s.page).unwrap_or_default();
                    (page.val(idx).to_vec(), next)
                }));
            }
            Some(Kind::Node) => match page.ceil(key, cmp) {
                Some(idx) => id = child(page, idx)?,
                None => return Ok(None),
            },
            kind => return Err(unexpected(id, kind)),
        }
    }
}

fn edge<S: Pager>(store: &mut S, mut id: u32, last: bool) -> Result<Option<Vec<u8>>> {
    for _ in 0..MAX_DEPTH {
        let page = store.page(id)?;
        let len = page.len();
        if len == 0 {
            return Ok(None);
        }
        let idx = if last { len - 1 } else { 0 };
        match page.kind() {
            Some(Kind::Leaf) => return Ok(Some(page.key(idx).to_vec())),
            Some(Kind::Node) => id = child(page, idx)?,
            kind => return Err(unexpected(id, kind)),
        }
    }
    Err(too_deep(id))
}

fn ceil_from<S: Pager>(
    store: &mut S,
    mut id: u32,
    key: &[u8],
    strict: bool,
) -> Result<Option<Vec<u8>>> {
    let cmp = store.comparator();
    for _ in 0..MAX_DEPTH {
        let page = store.page(id)?;
        // The separator is the max key of a child, so the first child with a separator
        // above the key is guaranteed to hold the answer.
        let idx = upper(page, key, cmp, strict);
        if idx >= page.len() {
            return Ok(None);
        }
        match page.kind() {
            Some(Kind::Leaf) => return Ok(Some(page.key(idx).to_vec())),
            Some(Kind::Node) => id = child(page, idx)?,
            kind => return Err(unexpected(id, kind)),
        }
    }
    Err(too_deep(id))
}

fn floor_from<S: Pager>(
    store: &mut S,
    id: u32,
    key: &[u8],
    strict: bool,
    depth: usize,
) -> Result<Option<Vec<u8>>> {
    if depth > MAX_DEPTH {
        return Err(too_deep(id));
    }
    let cmp = store.comparator();
    let page = store.page(id)?;
    match page.kind() {
        Some(Kind::Leaf) => {
            let idx = match page.search(key, cmp) {
                Ok(idx) if !strict => Some(idx),
                Ok(idx) | Err(idx) => idx.checked_sub(1),
            };
            Ok(idx.map(|idx| page.key(idx).to_vec()))
        }
        Some(Kind::Node) => {
            let len = page.len();
            let idx = upper(page, key, cmp, false);
            if idx >= len {
                if len == 0 {
                    return Ok(None);
                }
                let last = child(page, len - 1)?;
                return edge(store, last, true);
            }
            let here = child(page, idx)?;
            let prev = if idx > 0 {
                Some(child(page, idx - 1)?)
            } else {
                None
            };
            match floor_from(store, here, key, strict, depth + 1)? {
                Some(found) => Ok(Some(found)),
                None => match prev {
                    Some(prev) => edge(store, prev, true),
                    None => Ok(None),
                },
            }
        }
        kind => Err(unexpected(id, kind)),
    }
}

fn collect<S: Pager>(
    store: &mut S,
    id: u32,
    entries: &mut Vec<Entry>,
    pages: &mut Vec<u32>,
    depth: usize,
) -> Result<()> {
    let (kind, found) = read(store, id, depth)?;
    pages.push(id);
    match kind {
        Kind::Leaf => entries.extend(found),
        _ => {
            for (_, _, next) in found {
                collect(store, next, entries, pages, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn pack<S: Pager>(store: &mut S, kind: Kind, entries: &[Entry]) -> Result<Entry> {
    let id = store.allocate(kind)?;
    write(store, id, kind, entries)?;
    Ok((max_of(entries), vec![], id))
}

impl<S: Pager> Tree for S {
    fn lookup(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match locate(self, key)? {
            None => Ok(None),
            Some((val, 0)) => Ok(Some(val)),
            Some((len, first)) => {
                if len.len() != 4 {
                    return Err(Error::Corruption(first, "Malformed overflow reference".to_string()));
                }
                let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]);
                Ok(Some(read_chain(self, first, len as usize)?))
            }
        }
    }

    fn contains(&mut self, key: &[u8]) -> Result<bool> {
        Ok(locate(self, key)?.is_some())
    }

    fn insert(&mut self, key: &[u8], val: &[u8], mode: PutMode) -> Result<bool> {
        let max = max_key(self);
        if key.len() > max as usize {
            return Err(Error::Other(format!(
                "Key too long: {} bytes (max {})",
                key.len(),
                max
            )));
        }

        let existing = locate(self, key)?;
        if existing.is_some() && mode == PutMode::Keep {
            return Ok(false);
        }
        if let Some((_, first)) = existing {
            if first != 0 {
                free_chain(self, first)?;
            }
        }

        let (val, next) = if (key.len() + val.len()) as u32 > inline_limit(self) {
            let first = write_chain(self, val)?;
            ((val.len() as u32).to_be_bytes().to_vec(), first)
        } else {
            (val.to_vec(), 0)
        };

        let root = self.root();
        put(self, root, key, &val, next, 0)?;
        if existing.is_none() {
            self.set_count(self.count() + 1);
        }
        Ok(true)
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let root = self.root();
        if delete(self, root, key, 0)?.is_none() {
            return Ok(false);
        }
        collapse(self)?;
        self.set_count(self.count().saturating_sub(1));
        Ok(true)
    }

    fn first(&mut self) -> Result<Option<Vec<u8>>> {
        let root = self.root();
        edge(self, root, false)
    }

    fn last(&mut self) -> Result<Option<Vec<u8>>> {
        let root = self.root();
        edge(self, root, true)
    }

    fn ceil(&mut self, key: &[u8], strict: bool) -> Result<Option<Vec<u8>>> {
        let root = self.root();
        ceil_from(self, root, key, strict)
    }

    fn floor(&mut self, key: &[u8], strict: bool) -> Result<Option<Vec<u8>>> {
        let root = self.root();
        floor_from(self, root, key, strict, 0)
    }

    fn optimize(&mut self) -> Result<()> {
        let root = self.root();
        let mut entries = Vec::with_capacity(self.count() as usize);
        let mut pages = Vec::new();
        collect(self, root, &mut entries, &mut pages, 0)?;
        for id in pages.iter().filter(|id| **id != root) {
            self.free(*id);
        }

        let payload = payload(self);
        let mut kind = Kind::Leaf;
        let mut level = entries;
        let mut height = 1;
        while size(&level) > payload {
            let mut refs = Vec::with_capacity(level.len() / 4 + 1);
            let mut chunk = Vec::new();
            let mut used = 0;
            for entry in level {
                let n = entry_size(&entry);
                if used + n > payload {
                    refs.push(pack(self, kind, &chunk)?);
                    chunk.clear();
                    used = 0;
                }
                used += n;
                chunk.push(entry);
            }
            if !chunk.is_empty() {
                refs.push(pack(self, kind, &chunk)?);
            }
            level = refs;
            kind = Kind::Node;
            height += 1;
        }
        write(self, root, kind, &level)?;

        debug!(
            "Optimized: {} record(s), {} tree page(s) rebuilt, height {}",
            self.count(),
            pages.len(),
            height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::disk::block::Block;
    use crate::disk::file::File;
    use crate::disk::wal::wal_path;
    use crate::util;
    use std::fs;
    use std::path::PathBuf;

    fn path(name: &str) -> PathBuf {
        let path = PathBuf::from(format!("target/tree_{}.tmp", name));
        fs::create_dir_all("target").unwrap();
        if path.exists() {
            fs::remove_file(&path).unwrap();
        }
        fs::remove_file(wal_path(&path)).ok();
        path
    }

    fn open(path: &PathBuf) -> File<Block> {
        let config = Config::default().with_page_size(256).with_sync(false);
        File::open(path, &config).unwrap()
    }

    fn keys(file: &mut File<Block>) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let mut next = file.first().unwrap();
        while let Some(key) = next {
            next = file.ceil(&key, true).unwrap();
            keys.push(key);
        }
        keys
    }

    fn sorted(data: &[(Vec<u8>, Vec<u8>)]) -> Vec<Vec<u8>> {
        let mut keys = data.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>();
        keys.sort();
        keys
    }

    #[test]
    fn test_insert_lookup() {
        let path = path("small");
        let mut file = open(&path);
        assert!(file.insert(b"bbb", b"2", PutMode::Overwrite).unwrap());
        assert!(file.insert(b"aaa", b"1", PutMode::Overwrite).unwrap());
        assert!(file.insert(b"ccc", b"3", PutMode::Overwrite).unwrap());

        assert_eq!(file.lookup(b"aaa").unwrap(), Some(b"1".to_vec()));
        assert_eq!(file.lookup(b"ccc").unwrap(), Some(b"3".to_vec()));
        assert_eq!(file.lookup(b"ddd").unwrap(), None);
        assert_eq!(file.count(), 3);

        assert!(file.insert(b"bbb", b"two", PutMode::Overwrite).unwrap());
        assert_eq!(file.lookup(b"bbb").unwrap(), Some(b"two".to_vec()));
        assert_eq!(file.count(), 3);

        assert!(!file.insert(b"bbb", b"II", PutMode::Keep).unwrap());
        assert_eq!(file.lookup(b"bbb").unwrap(), Some(b"two".to_vec()));
        assert!(file.insert(b"eee", b"5", PutMode::Keep).unwrap());
        assert_eq!(file.count(), 4);
    }

    #[test]
    fn test_key_too_long() {
        let path = path("long_key");
        let mut file = open(&path);
        let max = max_key(&file) as usize;
        assert!(file.insert(&vec![1u8; max], b"ok", PutMode::Overwrite).unwrap());
        assert!(matches!(
            file.insert(&vec![1u8; max + 1], b"no", PutMode::Overwrite),
            Err(Error::Other(_))
        ));
        assert_eq!(file.count(), 1);
    }

    #[test]
    fn test_split_keeps_order() {
        let path = path("split");
        let mut file = open(&path);
        let data = util::data(2000, 42);
        for (k, v) in data.iter() {
            file.insert(k, v, PutMode::Overwrite).unwrap();
        }
        assert_eq!(file.count(), data.len() as u64);
        assert_eq!(file.page(file.root()).unwrap().kind(), Some(Kind::Node));

        for (k, v) in data.iter() {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v), "key={:?}", k);
        }
        assert_eq!(keys(&mut file), sorted(&data));
    }

    #[test]
    fn test_remove_rebalances() {
        let path = path("remove");
        let mut file = open(&path);
        let data = util::data(2000, 7);
        for (k, v) in data.iter() {
            file.insert(k, v, PutMode::Overwrite).unwrap();
        }

        let shuffled = util::shuffle(data, 7);
        let (gone, kept) = shuffled.split_at(1500);
        for (k, _) in gone.iter() {
            assert!(file.remove(k).unwrap());
            assert!(!file.remove(k).unwrap());
        }
        assert_eq!(file.count(), kept.len() as u64);
        for (k, _) in gone.iter() {
            assert_eq!(file.lookup(k).unwrap(), None);
        }
        for (k, v) in kept.iter() {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v));
        }
        assert_eq!(keys(&mut file), sorted(kept));

        for (k, _) in kept.iter() {
            assert!(file.remove(k).unwrap());
        }
        assert_eq!(file.count(), 0);
        assert_eq!(file.first().unwrap(), None);
        let root = file.page(file.root()).unwrap();
        assert_eq!(root.kind(), Some(Kind::Leaf));
        assert_eq!(root.len(), 0);

        file.flush().unwrap();
        drop(file);
        assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 256);
    }

    #[test]
    fn test_overflow_values() {
        let path = path("overflow");
        let mut file = open(&path);
        let big = (0..3000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();

        file.insert(b"big", &big, PutMode::Overwrite).unwrap();
        file.insert(b"small", b"x", PutMode::Overwrite).unwrap();
        assert_eq!(file.lookup(b"big").unwrap(), Some(big.clone()));
        assert!(file.contains(b"big").unwrap());
        assert!(!file.contains(b"bigger").unwrap());

        file.flush().unwrap();
        let len = fs::metadata(&path).unwrap().len();
        assert!(len > 3000);

        file.insert(b"big", b"tiny", PutMode::Overwrite).unwrap();
        assert_eq!(file.lookup(b"big").unwrap(), Some(b"tiny".to_vec()));
        file.flush().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 256);

        file.insert(b"big", &big, PutMode::Overwrite).unwrap();
        assert!(file.remove(b"big").unwrap());
        file.flush().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 256);
        assert_eq!(file.count(), 1);
    }

    #[test]
    fn test_ceil_floor() {
        let path = path("seek");
        let mut file = open(&path);
        for i in 1..=99u32 {
            let key = (i * 10).to_be_bytes();
            file.insert(&key, &key, PutMode::Overwrite).unwrap();
        }
        let key = |x: u32| Some(x.to_be_bytes().to_vec());
        let at = |x: u32| x.to_be_bytes();

        assert_eq!(file.first().unwrap(), key(10));
        assert_eq!(file.last().unwrap(), key(990));

        assert_eq!(file.ceil(&at(15), false).unwrap(), key(20));
        assert_eq!(file.ceil(&at(20), false).unwrap(), key(20));
        assert_eq!(file.ceil(&at(20), true).unwrap(), key(30));
        assert_eq!(file.ceil(&at(0), true).unwrap(), key(10));
        assert_eq!(file.ceil(&at(990), true).unwrap(), None);
        assert_eq!(file.ceil(&at(1000), false).unwrap(), None);

        assert_eq!(file.floor(&at(15), false).unwrap(), key(10));
        assert_eq!(file.floor(&at(500), false).unwrap(), key(500));
        assert_eq!(file.floor(&at(500), true).unwrap(), key(490));
        assert_eq!(file.floor(&at(10), true).unwrap(), None);
        assert_eq!(file.floor(&at(5), false).unwrap(), None);
        assert_eq!(file.floor(&at(1000), false).unwrap(), key(990));

        for i in 2..=99u32 {
            assert_eq!(file.floor(&at(i * 10), true).unwrap(), key(i * 10 - 10));
            assert_eq!(file.floor(&at(i * 10 - 1), false).unwrap(), key(i * 10 - 10));
        }
    }

    #[test]
    fn test_optimize() {
        let path = path("optimize");
        let mut file = open(&path);
        let big = vec![0xAB; 1000];
        file.insert(b"\xFF\xFF", &big, PutMode::Overwrite).unwrap();
        let data = util::data(1000, 3);
        for (k, v) in data.iter() {
            file.insert(k, v, PutMode::Overwrite).unwrap();
        }

        let shuffled = util::shuffle(data, 3);
        let (gone, kept) = shuffled.split_at(800);
        for (k, _) in gone.iter() {
            file.remove(k).unwrap();
        }
        file.flush().unwrap();
        let before = fs::metadata(&path).unwrap().len();

        file.optimize().unwrap();
        file.flush().unwrap();
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "before={} after={}", before, after);

        assert_eq!(file.count(), kept.len() as u64 + 1);
        for (k, v) in kept.iter() {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v));
        }
        assert_eq!(file.lookup(b"\xFF\xFF").unwrap(), Some(big));

        let mut expected = sorted(kept);
        expected.push(b"\xFF\xFF".to_vec());
        assert_eq!(keys(&mut file), expected);

        // The tree stays fully operational after being rebuilt.
        file.insert(b"\x00", b"zero", PutMode::Overwrite).unwrap();
        assert_eq!(file.first().unwrap(), Some(b"\x00".to_vec()));
    }

    #[test]
    fn test_persisted_tree() {
        let path = path("persist");
        let data = util::data(500, 11);
        {
            let mut file = open(&path);
            for (k, v) in data.iter() {
                file.insert(k, v, PutMode::Overwrite).unwrap();
            }
            file.flush().unwrap();
        }

        let mut file = open(&path);
        assert_eq!(file.count(), 500);
        for (k, v) in data.iter() {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v));
        }
        assert_eq!(keys(&mut file), sorted(&data));
    }
}
