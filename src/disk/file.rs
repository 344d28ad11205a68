use crate::api::compare::Comparator;
use crate::api::error::{Error, Result};
use crate::api::page::{Kind, Page};
use crate::api::pager::Pager;
use crate::config::{check_page_size, Config};
use crate::disk::wal::Wal;
use crate::util::cache::{Cache, LruCache};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;
use log::{debug, error, info};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct File<P: Page> {
    /// Underlying file reference where all data is physically stored.
    file: fs::File,
    head: Head,

    /// Header as it was last persisted.
    saved: Head,

    /// In-memory page cache. All page access happens only through cached page representation.
    cache: LruCache<u32, P>,

    /// Set of pages that requires flushing to the disk for durability.
    dirty: HashSet<u32>,

    /// Min-heap of available page identifiers (this helps avoid "gaps": empty pages inside file).
    empty: BinaryHeap<Reverse<u32>>,

    /// Free list changed since the last flush.
    freed: bool,

    wal: Wal,
    sync: bool,

    /// Corruption was detected or a committed flush was not applied, no further writes
    /// are accepted.
    broken: bool,
}

const MAGIC: &[u8] = b"ORDKVDB1";

/// Length of the meta data at the start of page 0 (the rest of the page is zeroed).
const META: usize = MAGIC.len() + 4 * 4 + 8 + 4 + 4;
const ROOT: u32 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Head {
    page_bytes: u32,
    page_count: u32,
    root: u32,
    free: u32,
    count: u64,
    cmp: Comparator,
}

/// In-memory state of the store to return to when a transaction is aborted.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    head: Head,
    empty: Vec<u32>,
    freed: bool,
}

impl Head {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.page_bytes as usize);
        buf.put_slice(MAGIC);
        buf.put_u32(self.page_bytes);
        buf.put_u32(self.page_count);
        buf.put_u32(self.root);
        buf.put_u32(self.free);
        buf.put_u64(self.count);
        buf.put_u32(self.cmp.id());
        let crc = crc(&buf[..]);
        buf.put_u32(crc);
        assert_eq!(buf.len(), META);
        buf.put_bytes(0, self.page_bytes as usize - META);
        buf
    }

    fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = src;
        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(Error::Corruption(0, format!("MAGIC mismatch: {:?}", magic)));
        }
        let mut stored = &src[(META - 4)..META];
        if crc(&src[..(META - 4)]) != stored.get_u32() {
            return Err(Error::Corruption(0, "Header checksum mismatch".to_string()));
        }

        let page_bytes = buf.get_u32();
        let page_count = buf.get_u32();
        let root = buf.get_u32();
        let free = buf.get_u32();
        let count = buf.get_u64();
        let cmp = buf.get_u32();
        let cmp = Comparator::from_id(cmp)
            .ok_or_else(|| Error::Corruption(0, format!("Unknown comparator: {}", cmp)))?;

        check_page_size(page_bytes)
            .map_err(|_| Error::Corruption(0, format!("Invalid page size: {}", page_bytes)))?;
        if root == 0 || root >= page_count || free >= page_count {
            return Err(Error::Corruption(
                0,
                format!("Page reference out of bounds: root={} free={}", root, free),
            ));
        }

        Ok(Self {
            page_bytes,
            page_count,
            root,
            free,
            count,
            cmp,
        })
    }
}

fn crc(buf: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(buf);
    hasher.finalize()
}

impl<P: Page> File<P> {
    /// Open the database file, creating it if it does not exist (or is empty).
    /// A non-empty write-ahead log left by a crash is recovered first.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        config.validate()?;
        let exists = path.exists() && fs::metadata(path)?.len() > 0;
        if exists {
            Self::load(path, config)
        } else {
            Self::make(path, config)
        }
    }

    fn make(path: &Path, config: &Config) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(path)?;

        let head = Head {
            page_bytes: config.page_size,
            page_count: 2,
            root: ROOT,
            free: 0,
            count: 0,
            cmp: config.comparator,
        };

        let mut buf = head.encode();
        let mut root = P::create(ROOT, head.page_bytes, Kind::Leaf);
        root.seal();
        buf.put_slice(root.as_ref());

        file.set_len(0)?;
        file.write_all(buf.as_ref())?;
        if config.sync {
            file.sync_all()?;
        }

        let mut wal = Wal::open(path, head.page_bytes, config.sync)?;
        wal.resize(head.page_bytes)?;
        info!("Created {:?} (page size: {})", path, head.page_bytes);

        Ok(Self::new(file, head, wal, config))
    }

    fn load(path: &Path, config: &Config) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut wal = Wal::open(path, config.page_size, config.sync)?;
        if !wal.is_empty()? {
            Self::recover(&mut file, &mut wal, config.sync)?;
        }

        let len = file.metadata()?.len();
        if len < META as u64 {
            return Err(Error::Corruption(0, "File too short".to_string()));
        }
        let mut meta = [0u8; META];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut meta)?;
        let head = Head::decode(&meta)?;

        if head.cmp != config.comparator {
            return Err(Error::Other(format!(
                "Comparator mismatch: file uses {:?}, {:?} requested",
                head.cmp, config.comparator
            )));
        }

        let expected = head.page_count as u64 * head.page_bytes as u64;
        if len < expected {
            return Err(Error::Corruption(
                0,
                format!("File too short: {} bytes, expected {}", len, expected),
            ));
        }
        if len > expected {
            file.set_len(expected)?;
        }

        if wal.page_bytes() != head.page_bytes {
            wal.resize(head.page_bytes)?;
        }

        let mut this = Self::new(file, head, wal, config);
        this.load_free_list()?;
        info!(
            "Opened {:?} (pages: {}, records: {}, free: {})",
            path,
            head.page_count,
            head.count,
            this.empty.len()
        );
        Ok(this)
    }

    fn new(file: fs::File, head: Head, wal: Wal, config: &Config) -> Self {
        Self {
            file,
            head,
            saved: head,
            cache: LruCache::new(config.cache_pages),
            dirty: HashSet::with_capacity(32),
            empty: BinaryHeap::with_capacity(16),
            freed: false,
            wal,
            sync: config.sync,
            broken: false,
        }
    }

    /// Roll the log forward into the data file: committed frames are applied, the rest dropped.
    fn recover(file: &mut fs::File, wal: &mut Wal, sync: bool) -> Result<()> {
        let page_bytes = wal.page_bytes() as u64;
        let applied = wal.replay(|id, data| {
            file.seek(SeekFrom::Start(id as u64 * page_bytes))?;
            file.write_all(data)?;
            Ok(())
        })?;
        if sync {
            file.sync_all()?;
        }
        wal.reset()?;
        info!("Recovered {} page(s) from the write-ahead log", applied);
        Ok(())
    }

    fn load_free_list(&mut self) -> Result<()> {
        // Keeps track of visited pages to avoid possible circular reference navigation.
        let mut seen = HashSet::with_capacity(16);
        let mut id = self.head.free;
        while id != 0 {
            if !seen.insert(id) {
                return Err(Error::Corruption(id, "Free list contains a cycle".to_string()));
            }
            let page = self.read_page(id)?;
            if page.kind() != Some(Kind::Free) {
                return Err(Error::Corruption(id, "Free list refers to a used page".to_string()));
            }
            self.empty.push(Reverse(id));
            id = page.slot(0).map(|slot| slot.page).unwrap_or_default();
        }
        Ok(())
    }

    fn read_page(&mut self, id: u32) -> Result<P> {
        let mut page = P::reserve(self.head.page_bytes);
        self.file.seek(SeekFrom::Start(self.offset(id)))?;
        self.file.read_exact(page.as_mut())?;
        if !page.verify() || page.id() != id {
            self.broken = true;
            error!("Page {} failed verification", id);
            return Err(Error::Corruption(id, "Page checksum mismatch".to_string()));
        }
        Ok(page)
    }

    fn save(&mut self, id: u32, page: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.offset(id)))?;
        self.file.write_all(page)?;
        Ok(())
    }

    fn offset(&self, id: u32) -> u64 {
        id as u64 * self.head.page_bytes as u64
    }

    fn writable(&self) -> Result<()> {
        if self.broken {
            return Err(Error::Corruption(
                0,
                "Writes refused until the store is reopened".to_string(),
            ));
        }
        Ok(())
    }

    fn evict(&mut self) {
        let dirty = &self.dirty;
        self.cache.shrink(|id| dirty.contains(id));
    }

    fn check(&self, id: u32) -> Result<()> {
        if id == 0 || id >= self.head.page_count {
            return Err(Error::Corruption(id, "Page reference out of bounds".to_string()));
        }
        Ok(())
    }

    fn fetch(&mut self, id: u32) -> Result<()> {
        self.check(id)?;
        if !self.cache.has(&id) {
            let page = self.read_page(id)?;
            self.evict();
            self.cache.put(id, page);
        }
        Ok(())
    }

    /// True when there are more modified pages than the cache is meant to hold.
    pub(crate) fn needs_flush(&self) -> bool {
        self.dirty.len() > self.cache.cap()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            head: self.head,
            empty: self.empty.iter().map(|id| id.0).collect(),
            freed: self.freed,
        }
    }

    /// Drop every change made since the snapshot was taken. Only valid if nothing was
    /// flushed in between.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        let dirty = self.dirty.drain().collect::<Vec<_>>();
        for id in dirty.iter() {
            self.cache.take(id);
        }
        debug!("Discarded {} modified page(s)", dirty.len());
        self.head = snapshot.head;
        self.empty = snapshot.empty.into_iter().map(Reverse).collect();
        self.freed = snapshot.freed;
    }

    /// True once a flush failed after its changes were committed to the log. Such a
    /// store refuses writes until it is reopened and the log is rolled forward.
    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    fn log(&mut self, ids: &[u32], free: &[P], meta: &[u8]) -> Result<()> {
        for id in ids.iter() {
            if let Some(page) = self.cache.get_mut(id) {
                page.seal();
                self.wal.append(*id, page.as_ref())?;
            }
        }
        for page in free.iter() {
            self.wal.append(page.id(), page.as_ref())?;
        }
        self.wal.append(0, meta)?;
        self.wal.commit()
    }

    fn apply(&mut self, ids: &[u32], free: &[P], meta: &[u8]) -> Result<()> {
        for id in ids.iter() {
            let bytes = match self.cache.get(id) {
                Some(page) => page.as_ref().to_vec(),
                None => continue,
            };
            self.save(*id, &bytes)?;
        }
        for page in free.iter() {
            self.save(page.id(), page.as_ref())?;
        }
        self.save(0, meta)?;
        self.file
            .set_len(self.head.page_count as u64 * self.head.page_bytes as u64)?;
        if self.sync {
            self.file.sync_data()?;
        }
        self.wal.reset()
    }

    /// Rewrite the chain of free pages, trimming free pages off the end of the file first.
    fn free_pages(&mut self) -> Vec<P> {
        let mut ids = self.empty.drain().map(|id| id.0).collect::<Vec<_>>();
        ids.sort_unstable();
        while ids.last() == Some(&(self.head.page_count - 1)) {
            ids.pop();
            self.head.page_count -= 1;
        }
        self.head.free = ids.first().cloned().unwrap_or_default();
        self.empty = ids.iter().cloned().map(Reverse).collect();

        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let next = ids.get(i + 1).cloned().unwrap_or_default();
                let mut page = P::create(*id, self.head.page_bytes, Kind::Free);
                page.push(&[], &[], next);
                page.seal();
                page
            })
            .collect()
    }
}

impl<P: Page> Pager for File<P> {
    type Page = P;

    fn page(&mut self, id: u32) -> Result<&P> {
        self.fetch(id)?;
        self.cache
            .get(&id)
            .ok_or_else(|| Error::Corruption(id, "Page missing from cache".to_string()))
    }

    fn page_mut(&mut self, id: u32) -> Result<&mut P> {
        self.writable()?;
        self.fetch(id)?;
        self.dirty.insert(id);
        self.cache
            .get_mut(&id)
            .ok_or_else(|| Error::Corruption(id, "Page missing from cache".to_string()))
    }

    fn allocate(&mut self, kind: Kind) -> Result<u32> {
        self.writable()?;
        let id = match self.empty.pop() {
            Some(Reverse(id)) => {
                self.freed = true;
                id
            }
            None => {
                let id = self.head.page_count;
                self.head.page_count = id.checked_add(1).ok_or_else(|| {
                    Error::Other("Maximum number of pages reached".to_string())
                })?;
                id
            }
        };
        self.evict();
        self.cache.put(id, P::create(id, self.head.page_bytes, kind));
        self.dirty.insert(id);
        Ok(id)
    }

    fn free(&mut self, id: u32) {
        self.cache.take(&id);
        self.dirty.remove(&id);
        self.empty.push(Reverse(id));
        self.freed = true;
    }

    fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() && !self.freed && self.head == self.saved {
            return Ok(());
        }
        self.writable()?;
        if !self.wal.is_empty()? {
            // Leftover of a failed attempt, frames after it would never be replayed.
            self.wal.reset()?;
        }

        let free = if self.freed {
            self.free_pages()
        } else {
            Vec::new()
        };

        let mut ids = self.dirty.iter().cloned().collect::<Vec<_>>();
        ids.sort_unstable();
        let meta = self.head.encode();

        if let Err(e) = self.log(&ids, &free, &meta) {
            if self.wal.reset().is_err() {
                self.broken = true;
            }
            return Err(e);
        }
        if let Err(e) = self.apply(&ids, &free, &meta) {
            // The batch is committed in the log: reopening rolls it forward.
            self.broken = true;
            error!("Failed to apply committed changes: {}", e);
            return Err(e);
        }

        debug!(
            "Flushed {} page(s) and {} free page(s), {} page(s) total",
            ids.len(),
            free.len(),
            self.head.page_count
        );
        self.dirty.clear();
        self.freed = false;
        self.saved = self.head;
        self.evict();
        Ok(())
    }

    fn root(&self) -> u32 {
        self.head.root
    }

    fn page_bytes(&self) -> u32 {
        self.head.page_bytes
    }

    fn comparator(&self) -> Comparator {
        self.head.cmp
    }

    fn count(&self) -> u64 {
        self.head.count
    }

    fn set_count(&mut self, count: u64) {
        self.head.count = count;
    }
}
