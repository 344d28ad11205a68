use crate::api::error::{Error, Result};
use crate::api::tree::{PutMode, Tree};
use log::trace;

/// Direction of a cursor jump.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    /// Land on the smallest key greater or equal to the target.
    Forward,
    /// Land on the biggest key lesser or equal to the target.
    Backward,
}

/// Cursor position is the key of the current record, not a page location, so splits,
/// merges and rebuilds of the tree never invalidate it.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub(crate) enum Position {
    #[default]
    Unpositioned,
    OnRecord(Vec<u8>),
    Exhausted,
}

#[derive(Debug, Default)]
pub(crate) struct Cursor {
    position: Position,
}

impl Cursor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> &Position {
        &self.position
    }

    fn settle(&mut self, found: Option<Vec<u8>>) -> bool {
        match found {
            Some(key) => {
                self.position = Position::OnRecord(key);
                true
            }
            None => {
                self.position = Position::Exhausted;
                false
            }
        }
    }

    fn current(&self) -> Result<&[u8]> {
        match &self.position {
            Position::OnRecord(key) => Ok(key),
            other => Err(Error::InvalidState(format!(
                "Cursor is not on a record: {:?}",
                other
            ))),
        }
    }

    pub(crate) fn first<T: Tree>(&mut self, tree: &mut T) -> Result<bool> {
        let found = tree.first()?;
        Ok(self.settle(found))
    }

    pub(crate) fn last<T: Tree>(&mut self, tree: &mut T) -> Result<bool> {
        let found = tree.last()?;
        Ok(self.settle(found))
    }

    /// Move to the next key. Does nothing but return false unless on a record.
    pub(crate) fn next<T: Tree>(&mut self, tree: &mut T) -> Result<bool> {
        let found = match &self.position {
            Position::OnRecord(key) => tree.ceil(key, true)?,
            _ => return Ok(false),
        };
        Ok(self.settle(found))
    }

    pub(crate) fn previous<T: Tree>(&mut self, tree: &mut T) -> Result<bool> {
        let found = match &self.position {
            Position::OnRecord(key) => tree.floor(key, true)?,
            _ => return Ok(false),
        };
        Ok(self.settle(found))
    }

    pub(crate) fn jump<T: Tree>(
        &mut self,
        tree: &mut T,
        key: &[u8],
        direction: Direction,
    ) -> Result<bool> {
        let found = match direction {
            Direction::Forward => tree.ceil(key, false)?,
            Direction::Backward => tree.floor(key, false)?,
        };
        Ok(self.settle(found))
    }

    /// Key of the current record, `None` if the record was removed since the cursor landed on it.
    pub(crate) fn key<T: Tree>(&self, tree: &mut T) -> Result<Option<Vec<u8>>> {
        let key = self.current()?;
        Ok(tree.contains(key)?.then(|| key.to_vec()))
    }

    pub(crate) fn value<T: Tree>(&self, tree: &mut T) -> Result<Option<Vec<u8>>> {
        let key = self.current()?;
        tree.lookup(key)
    }

    pub(crate) fn put<T: Tree>(&self, tree: &mut T, val: &[u8]) -> Result<()> {
        let key = self.current()?;
        if !tree.contains(key)? {
            return Err(Error::InvalidState(
                "Record under the cursor no longer exists".to_string(),
            ));
        }
        tree.insert(key, val, PutMode::Overwrite)?;
        Ok(())
    }

    /// Remove the current record, leaving the cursor unpositioned.
    pub(crate) fn remove<T: Tree>(&mut self, tree: &mut T) -> Result<()> {
        let found = tree.remove(self.current()?)?;
        if !found {
            trace!("Cursor record already removed");
        }
        self.position = Position::Unpositioned;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::page::{Kind, Page};
    use crate::api::pager::Pager;
    use crate::config::Config;
    use crate::disk::block::Block;
    use crate::disk::file::File;
    use crate::disk::wal::wal_path;
    use std::fs;
    use std::path::PathBuf;

    fn open(name: &str) -> File<Block> {
        let path = PathBuf::from(format!("target/cursor_{}.tmp", name));
        fs::create_dir_all("target").unwrap();
        if path.exists() {
            fs::remove_file(&path).unwrap();
        }
        fs::remove_file(wal_path(&path)).ok();
        let config = Config::default().with_page_size(256).with_sync(false);
        File::open(&path, &config).unwrap()
    }

    fn fill(file: &mut File<Block>, count: u32) {
        for i in 0..count {
            let key = format!("key-{:04}", i);
            file.insert(key.as_bytes(), &i.to_be_bytes(), PutMode::Overwrite)
                .unwrap();
        }
    }

    fn key(i: u32) -> Vec<u8> {
        format!("key-{:04}", i).into_bytes()
    }

    #[test]
    fn test_traversal() {
        let mut file = open("traversal");
        fill(&mut file, 300);
        let mut cursor = Cursor::new();

        let mut seen = Vec::new();
        let mut ok = cursor.first(&mut file).unwrap();
        while ok {
            seen.push(cursor.key(&mut file).unwrap().unwrap());
            ok = cursor.next(&mut file).unwrap();
        }
        assert_eq!(seen, (0..300).map(key).collect::<Vec<_>>());
        assert_eq!(cursor.position(), &Position::Exhausted);
        assert!(!cursor.next(&mut file).unwrap());

        let mut seen = Vec::new();
        let mut ok = cursor.last(&mut file).unwrap();
        while ok {
            seen.push(cursor.key(&mut file).unwrap().unwrap());
            ok = cursor.previous(&mut file).unwrap();
        }
        assert_eq!(seen, (0..300).rev().map(key).collect::<Vec<_>>());
        assert!(!cursor.previous(&mut file).unwrap());
    }

    #[test]
    fn test_jump() {
        let mut file = open("jump");
        fill(&mut file, 100);
        let mut cursor = Cursor::new();

        assert!(cursor.jump(&mut file, b"key-0041x", Direction::Forward).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(42)));
        assert!(cursor.jump(&mut file, b"key-0041x", Direction::Backward).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(41)));
        assert!(cursor.jump(&mut file, &key(7), Direction::Forward).unwrap());
        assert_eq!(cursor.value(&mut file).unwrap(), Some(7u32.to_be_bytes().to_vec()));

        assert!(!cursor.jump(&mut file, b"zzz", Direction::Forward).unwrap());
        assert_eq!(cursor.position(), &Position::Exhausted);
        assert!(cursor.jump(&mut file, b"zzz", Direction::Backward).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(99)));
        assert!(!cursor.jump(&mut file, b"a", Direction::Backward).unwrap());
    }

    #[test]
    fn test_invalid_state() {
        let mut file = open("state");
        let mut cursor = Cursor::new();
        assert!(matches!(cursor.key(&mut file), Err(Error::InvalidState(_))));
        assert!(matches!(cursor.value(&mut file), Err(Error::InvalidState(_))));
        assert!(matches!(cursor.put(&mut file, b"v"), Err(Error::InvalidState(_))));
        assert!(matches!(cursor.remove(&mut file), Err(Error::InvalidState(_))));
        assert!(!cursor.next(&mut file).unwrap());
        assert!(!cursor.previous(&mut file).unwrap());

        assert!(!cursor.first(&mut file).unwrap());
        assert!(!cursor.last(&mut file).unwrap());
        assert!(matches!(cursor.key(&mut file), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_put_and_remove() {
        let mut file = open("modify");
        fill(&mut file, 50);
        let mut cursor = Cursor::new();

        assert!(cursor.jump(&mut file, &key(10), Direction::Forward).unwrap());
        cursor.put(&mut file, b"ten").unwrap();
        assert_eq!(file.lookup(&key(10)).unwrap(), Some(b"ten".to_vec()));

        cursor.remove(&mut file).unwrap();
        assert_eq!(cursor.position(), &Position::Unpositioned);
        assert_eq!(file.lookup(&key(10)).unwrap(), None);
        assert_eq!(file.count(), 49);
        assert!(!cursor.next(&mut file).unwrap());
    }

    #[test]
    fn test_vanished_record() {
        let mut file = open("vanished");
        fill(&mut file, 50);
        let mut cursor = Cursor::new();

        assert!(cursor.jump(&mut file, &key(20), Direction::Forward).unwrap());
        file.remove(&key(20)).unwrap();

        assert_eq!(cursor.key(&mut file).unwrap(), None);
        assert_eq!(cursor.value(&mut file).unwrap(), None);
        assert!(matches!(cursor.put(&mut file, b"v"), Err(Error::InvalidState(_))));
        assert_eq!(file.lookup(&key(20)).unwrap(), None);

        // Movement continues from the remembered key.
        assert!(cursor.next(&mut file).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(21)));
        assert!(cursor.previous(&mut file).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(19)));

        file.remove(&key(19)).unwrap();
        cursor.remove(&mut file).unwrap();
        assert_eq!(file.count(), 48);
    }

    #[test]
    fn test_survives_rebuild() {
        let mut file = open("rebuild");
        fill(&mut file, 200);
        let mut cursor = Cursor::new();
        assert!(cursor.jump(&mut file, &key(100), Direction::Forward).unwrap());

        for i in (0..200).filter(|i| i % 3 == 0 && *i != 100) {
            file.remove(&key(i)).unwrap();
        }
        file.optimize().unwrap();

        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(100)));
        assert!(cursor.next(&mut file).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(101)));
        assert!(cursor.next(&mut file).unwrap());
        assert_eq!(cursor.key(&mut file).unwrap(), Some(key(103)));
    }

    #[test]
    fn test_key_skips_overflow_chain() {
        let mut file = open("overflow");
        let big = vec![7u8; 2000];
        file.insert(b"big", &big, PutMode::Overwrite).unwrap();
        let mut cursor = Cursor::new();
        assert!(cursor.first(&mut file).unwrap());
        assert_eq!(cursor.value(&mut file).unwrap(), Some(big));

        // Break the chain: the key is still reported, only reading the value fails.
        let root = file.root();
        let first = file.page(root).unwrap().slot(0).unwrap().page;
        file.page_mut(first).unwrap().clear(Kind::Free);

        assert_eq!(cursor.key(&mut file).unwrap(), Some(b"big".to_vec()));
        assert!(cursor.value(&mut file).is_err());
    }
}
