use crate::api::error::{Error, Result};
use crate::api::pager::Pager;
use crate::api::tree::{PutMode, Tree};
use crate::api::Store;
use crate::config::Config;
use crate::cursor::{Cursor, Direction};
use crate::disk::block::Block;
use crate::disk::file::File;
use crate::txn::TransactionManager;
use log::{error, info};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

struct Inner {
    file: File<Block>,
    txn: TransactionManager,
    cursor: Cursor,
}

impl Inner {
    /// Run a modification, flushing afterwards if it left too many pages dirty.
    fn modify<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self)?;
        self.txn.autocommit(&mut self.file)?;
        Ok(result)
    }
}

/// Handle to an open database file.
///
/// All operations are serialized by a single lock, the handle can be shared between threads
/// (e.g. in an `Arc`). Changes made outside of a transaction become durable on `sync`,
/// `close`, or once the modified pages outgrow the page cache.
pub struct Database {
    path: PathBuf,
    inner: Mutex<Option<Inner>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, Config::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path, &config)?;
        info!("Database {:?} open, {} record(s)", path, file.count());
        Ok(Self {
            path,
            inner: Mutex::new(Some(Inner {
                file,
                txn: TransactionManager::new(),
                cursor: Cursor::new(),
            })),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(Error::Closed)?;
        f(inner)
    }

    /// Abort an active transaction, write pending changes and release the file.
    /// Closing a closed database does nothing.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if let Some(mut inner) = guard.take() {
            if inner.txn.is_active() {
                inner.txn.abort(&mut inner.file)?;
            }
            inner.file.flush()?;
            info!("Database {:?} closed", self.path);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    pub fn name(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn put(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.put_with(key, val, PutMode::Overwrite).map(|_| ())
    }

    /// Returns false if `PutMode::Keep` left an existing record in place.
    pub fn put_with(&self, key: &[u8], val: &[u8], mode: PutMode) -> Result<bool> {
        self.with(|inner| inner.modify(|inner| inner.file.insert(key, val, mode)))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.file.lookup(key))
    }

    /// Returns true if the record existed. Removing a missing key is not an error.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        self.with(|inner| inner.modify(|inner| Tree::remove(&mut inner.file, key)))
    }

    /// Number of records.
    pub fn size(&self) -> Result<u64> {
        self.with(|inner| Ok(inner.file.count()))
    }

    /// Rebuild the index with fully packed pages and shrink the file. Outside of a
    /// transaction the result is written immediately.
    pub fn optimize(&self) -> Result<()> {
        self.with(|inner| {
            inner.file.optimize()?;
            if !inner.txn.is_active() {
                inner.file.flush()?;
            }
            Ok(())
        })
    }

    /// Make all changes durable. Not allowed within a transaction, use `commit` instead.
    pub fn sync(&self) -> Result<()> {
        self.with(|inner| {
            if inner.txn.is_active() {
                return Err(Error::TransactionInProgress);
            }
            inner.file.flush()
        })
    }

    pub fn begin(&self) -> Result<()> {
        self.with(|inner| inner.txn.begin(&mut inner.file))
    }

    pub fn commit(&self) -> Result<()> {
        self.with(|inner| inner.txn.commit(&mut inner.file))
    }

    pub fn abort(&self) -> Result<()> {
        self.with(|inner| inner.txn.abort(&mut inner.file))
    }

    pub fn in_transaction(&self) -> Result<bool> {
        self.with(|inner| Ok(inner.txn.is_active()))
    }

    pub fn cursor_first(&self) -> Result<bool> {
        self.with(|inner| inner.cursor.first(&mut inner.file))
    }

    pub fn cursor_last(&self) -> Result<bool> {
        self.with(|inner| inner.cursor.last(&mut inner.file))
    }

    pub fn cursor_next(&self) -> Result<bool> {
        self.with(|inner| inner.cursor.next(&mut inner.file))
    }

    pub fn cursor_previous(&self) -> Result<bool> {
        self.with(|inner| inner.cursor.previous(&mut inner.file))
    }

    pub fn cursor_jump(&self, key: &[u8], direction: Direction) -> Result<bool> {
        self.with(|inner| inner.cursor.jump(&mut inner.file, key, direction))
    }

    pub fn cursor_jump_forward(&self, key: &[u8]) -> Result<bool> {
        self.cursor_jump(key, Direction::Forward)
    }

    pub fn cursor_jump_backward(&self, key: &[u8]) -> Result<bool> {
        self.cursor_jump(key, Direction::Backward)
    }

    /// Key under the cursor, `None` if that record was removed in the meantime.
    pub fn cursor_key(&self) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.cursor.key(&mut inner.file))
    }

    pub fn cursor_value(&self) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.cursor.value(&mut inner.file))
    }

    pub fn cursor_put(&self, val: &[u8]) -> Result<()> {
        self.with(|inner| {
            inner.modify(|inner| {
                let Inner { file, cursor, .. } = inner;
                cursor.put(file, val)
            })
        })
    }

    pub fn cursor_remove(&self) -> Result<()> {
        self.with(|inner| {
            inner.modify(|inner| {
                let Inner { file, cursor, .. } = inner;
                cursor.remove(file)
            })
        })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close database {:?}: {}", self.path, e);
        }
    }
}

impl Store for Database {
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(key)
    }

    fn insert(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.put(key, val)
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        Database::remove(self, key).map(|_| ())
    }

    fn is_empty(&self) -> bool {
        self.size().map(|n| n == 0).unwrap_or(true)
    }

    fn min(&self) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.file.first())
    }

    fn max(&self) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.file.last())
    }

    fn above(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.file.ceil(key, true))
    }

    fn below(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with(|inner| inner.file.floor(key, true))
    }
}
