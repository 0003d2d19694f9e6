//! Recent reads, per alias.

use crate::network::application::onep::DataPoint;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<DataPoint>,
    fetched_at: i64,
}

/// Last read result per alias.
///
/// An entry serves a read only while it is fresh and holds exactly the
/// number of points asked for. When a new alias arrives and the cache is at
/// capacity, every entry is dropped rather than evicting one.
#[derive(Debug)]
pub struct ReadCache {
    capacity: usize,
    expire_secs: i64,
    entries: HashMap<String, Entry>,
}

impl ReadCache {
    pub fn new(capacity: usize, expire_secs: i64) -> Self {
        Self {
            capacity,
            expire_secs,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, alias: &str, count: usize, now: i64) -> Option<&[DataPoint]> {
        let entry = self.entries.get(alias)?;
        let fresh = now - entry.fetched_at <= self.expire_secs;
        (fresh && entry.data.len() == count).then_some(entry.data.as_slice())
    }

    pub fn insert(&mut self, alias: &str, data: Vec<DataPoint>, now: i64) {
        if !self.entries.contains_key(alias) && self.entries.len() >= self.capacity {
            tracing::debug!(entries = self.entries.len(), "read cache full, clearing");
            self.entries.clear();
        }
        self.entries.insert(
            alias.to_owned(),
            Entry {
                data,
                fetched_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
