use std::path::Path;

use crate::api::Store as KVStore;
use crate::config::Config;
use crate::db::Database;

pub struct Store(Database);

impl Store {
    pub fn database(&self) -> &Database {
        &self.0
    }
}

pub trait DB<K, V>
where
    K: AsRef<[u8]> + for<'a> From<&'a [u8]>,
    V: AsRef<[u8]> + for<'a> From<&'a [u8]>,
{
    fn new(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn contains(&self, key: &K) -> anyhow::Result<bool>;
    fn lookup(&self, key: &K) -> anyhow::Result<Option<V>>;
    fn remove(&mut self, key: &K) -> anyhow::Result<Option<V>>;
    fn insert(&mut self, key: &K, val: V) -> anyhow::Result<()>;

    fn min(&self) -> anyhow::Result<Option<K>>;
    fn max(&self) -> anyhow::Result<Option<K>>;
    fn above(&self, key: &K) -> anyhow::Result<Option<K>>;
    fn below(&self, key: &K) -> anyhow::Result<Option<K>>;
}

impl<K, V> DB<K, V> for Store
where
    K: AsRef<[u8]> + for<'a> From<&'a [u8]>,
    V: AsRef<[u8]> + for<'a> From<&'a [u8]>,
{
    fn new(path: &Path) -> anyhow::Result<Self> {
        Ok(Self(Database::open_with(path, Config::default())?))
    }

    fn contains(&self, key: &K) -> anyhow::Result<bool> {
        Ok(self.0.lookup(key.as_ref())?.is_some())
    }

    fn lookup(&self, key: &K) -> anyhow::Result<Option<V>> {
        Ok(self.0.lookup(key.as_ref())?.map(|bytes| V::from(bytes.as_slice())))
    }

    fn remove(&mut self, key: &K) -> anyhow::Result<Option<V>> {
        let val = DB::<K, V>::lookup(self, key)?;
        KVStore::remove(&self.0, key.as_ref())?;
        Ok(val)
    }

    fn insert(&mut self, key: &K, val: V) -> anyhow::Result<()> {
        Ok(KVStore::insert(&self.0, key.as_ref(), val.as_ref())?)
    }

    fn min(&self) -> anyhow::Result<Option<K>> {
        Ok(self.0.min()?.map(|bytes| K::from(bytes.as_slice())))
    }

    fn max(&self) -> anyhow::Result<Option<K>> {
        Ok(self.0.max()?.map(|bytes| K::from(bytes.as_slice())))
    }

    fn above(&self, key: &K) -> anyhow::Result<Option<K>> {
        Ok(self.0.above(key.as_ref())?.map(|bytes| K::from(bytes.as_slice())))
    }

    fn below(&self, key: &K) -> anyhow::Result<Option<K>> {
        Ok(self.0.below(key.as_ref())?.map(|bytes| K::from(bytes.as_slice())))
    }
}
