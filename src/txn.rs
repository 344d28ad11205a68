use crate::api::error::{Error, Result};
use crate::api::page::Page;
use crate::api::pager::Pager;
use crate::disk::file::{File, Snapshot};
use log::{debug, warn};

enum State {
    Idle,
    /// Store metadata as it was when the transaction began.
    Active(Snapshot),
}

/// Single-writer transactions over a page store.
///
/// While a transaction is active modified pages only live in the page cache (they are
/// pinned there), so nothing reaches the disk before `commit`. Abort drops those pages
/// and restores the snapshot, leaving the store exactly as it was at `begin`.
pub(crate) struct TransactionManager {
    state: State,
}

impl TransactionManager {
    pub(crate) fn new() -> Self {
        Self { state: State::Idle }
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    pub(crate) fn begin<P: Page>(&mut self, file: &mut File<P>) -> Result<()> {
        if self.is_active() {
            return Err(Error::TransactionInProgress);
        }
        file.flush()?;
        self.state = State::Active(file.snapshot());
        debug!("Transaction started");
        Ok(())
    }

    /// Make the changes durable. If the flush fails before the changes reach the log the
    /// transaction stays active and may be aborted. Once they are in the log the commit
    /// stands: the transaction ends and the store refuses writes until it is reopened.
    pub(crate) fn commit<P: Page>(&mut self, file: &mut File<P>) -> Result<()> {
        if !self.is_active() {
            return Err(Error::NoActiveTransaction);
        }
        let broken = file.is_broken();
        if let Err(e) = file.flush() {
            if !broken && file.is_broken() {
                self.state = State::Idle;
                warn!("Transaction committed to the log but not applied: {}", e);
            }
            return Err(e);
        }
        self.state = State::Idle;
        debug!("Transaction committed");
        Ok(())
    }

    pub(crate) fn abort<P: Page>(&mut self, file: &mut File<P>) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(Error::NoActiveTransaction),
            State::Active(snapshot) => {
                file.restore(snapshot);
                debug!("Transaction aborted");
                Ok(())
            }
        }
    }

    /// Outside of a transaction, write pending changes once they outgrow the page cache.
    pub(crate) fn autocommit<P: Page>(&self, file: &mut File<P>) -> Result<()> {
        if !self.is_active() && file.needs_flush() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tree::{PutMode, Tree};
    use crate::config::Config;
    use crate::disk::block::Block;
    use crate::disk::wal::wal_path;
    use crate::util;
    use std::fs;
    use std::path::PathBuf;

    fn path(name: &str) -> PathBuf {
        let path = PathBuf::from(format!("target/txn_{}.tmp", name));
        fs::create_dir_all("target").unwrap();
        if path.exists() {
            fs::remove_file(&path).unwrap();
        }
        fs::remove_file(wal_path(&path)).ok();
        path
    }

    fn config() -> Config {
        Config::default()
            .with_page_size(256)
            .with_cache_pages(16)
            .with_sync(false)
    }

    #[test]
    fn test_states() {
        let path = path("states");
        let mut file: File<Block> = File::open(&path, &config()).unwrap();
        let mut txn = TransactionManager::new();

        assert!(matches!(txn.commit(&mut file), Err(Error::NoActiveTransaction)));
        assert!(matches!(txn.abort(&mut file), Err(Error::NoActiveTransaction)));

        txn.begin(&mut file).unwrap();
        assert!(txn.is_active());
        assert!(matches!(txn.begin(&mut file), Err(Error::TransactionInProgress)));
        txn.commit(&mut file).unwrap();
        assert!(!txn.is_active());

        txn.begin(&mut file).unwrap();
        txn.abort(&mut file).unwrap();
        assert!(!txn.is_active());
    }

    #[test]
    fn test_abort_restores() {
        let path = path("abort");
        let mut file: File<Block> = File::open(&path, &config()).unwrap();
        let mut txn = TransactionManager::new();

        let data = util::data(100, 1);
        for (k, v) in data.iter().take(50) {
            file.insert(k, v, PutMode::Overwrite).unwrap();
        }

        txn.begin(&mut file).unwrap();
        let len = fs::metadata(&path).unwrap().len();
        for (k, v) in data.iter().skip(50) {
            file.insert(k, v, PutMode::Overwrite).unwrap();
        }
        for (k, _) in data.iter().take(10) {
            file.remove(k).unwrap();
        }
        file.optimize().unwrap();
        assert_eq!(file.count(), 90);
        // Nothing reaches the disk while the transaction is active.
        assert_eq!(fs::metadata(&path).unwrap().len(), len);
        txn.abort(&mut file).unwrap();

        assert_eq!(file.count(), 50);
        for (k, v) in data.iter().take(50) {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v));
        }
        for (k, _) in data.iter().skip(50) {
            assert_eq!(file.lookup(k).unwrap(), None);
        }
    }

    #[test]
    fn test_commit_is_durable() {
        let path = path("commit");
        let data = util::data(200, 2);
        {
            let mut file: File<Block> = File::open(&path, &config()).unwrap();
            let mut txn = TransactionManager::new();
            txn.begin(&mut file).unwrap();
            for (k, v) in data.iter() {
                file.insert(k, v, PutMode::Overwrite).unwrap();
                txn.autocommit(&mut file).unwrap();
            }
            txn.commit(&mut file).unwrap();
            // Dropped without any further flush.
        }

        let mut file: File<Block> = File::open(&path, &config()).unwrap();
        assert_eq!(file.count(), 200);
        for (k, v) in data.iter() {
            assert_eq!(file.lookup(k).unwrap().as_ref(), Some(v));
        }
    }

    #[test]
    fn test_autocommit() {
        let path = path("autocommit");
        let mut file: File<Block> = File::open(&path, &config()).unwrap();
        let txn = TransactionManager::new();

        for (k, v) in util::data(500, 3).iter() {
            file.insert(k, v, PutMode::Overwrite).unwrap();
            txn.autocommit(&mut file).unwrap();
            assert!(!file.needs_flush());
        }
        assert!(fs::metadata(&path).unwrap().len() > 2 * 256);
    }
}
