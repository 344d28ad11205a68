use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

pub(crate) trait Cache<K: Clone + Eq + PartialEq + Hash, V> {
    fn has(&self, key: &K) -> bool;
    fn get(&self, key: &K) -> Option<&V>;
    fn get_mut(&mut self, key: &K) -> Option<&mut V>;
    fn put(&mut self, key: K, value: V);
    fn take(&mut self, key: &K) -> Option<V>;

    /// Evict least recently used entries until the cache is back within capacity.
    /// Entries for which `pinned` returns true are never evicted.
    fn shrink<F: Fn(&K) -> bool>(&mut self, pinned: F) -> Vec<K>;
}

pub(crate) struct LruCache<K, V> {
    map: HashMap<K, V>,
    lru: RefCell<Vec<K>>,
    cap: usize,
}

impl<K: Clone + Eq + Hash + Display, V> LruCache<K, V> {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            map: HashMap::with_capacity(size),
            lru: RefCell::new(Vec::with_capacity(size)),
            cap: size,
        }
    }

    pub(crate) fn cap(&self) -> usize {
        self.cap
    }

    fn touch(&self, key: &K) {
        let mut lru = self.lru.borrow_mut();
        if let Some(idx) = lru.iter().position(|x| x == key) {
            lru.remove(idx);
        }
        lru.push(key.clone());
    }
}

impl<K: Clone + Hash + Eq + Display, V> Cache<K, V> for LruCache<K, V> {
    fn has(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<&V> {
        if !self.map.contains_key(key) {
            None
        } else {
            self.touch(key);
            self.map.get(key)
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if !self.map.contains_key(key) {
            None
        } else {
            self.touch(key);
            self.map.get_mut(key)
        }
    }

    fn put(&mut self, key: K, value: V) {
        self.touch(&key);
        self.map.insert(key, value);
    }

    fn take(&mut self, key: &K) -> Option<V> {
        let value = self.map.remove(key)?;
        self.lru.get_mut().retain(|x| x != key);
        Some(value)
    }

    fn shrink<F: Fn(&K) -> bool>(&mut self, pinned: F) -> Vec<K> {
        let mut evicted = Vec::new();
        let lru = self.lru.get_mut();
        let mut idx = 0;
        while self.map.len() > self.cap && idx < lru.len() {
            if pinned(&lru[idx]) {
                idx += 1;
                continue;
            }
            let key = lru.remove(idx);
            self.map.remove(&key);
            trace!("Evicted page {}", key);
            evicted.push(key);
        }
        evicted
    }
}
