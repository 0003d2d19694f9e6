use std::collections::HashMap;

/// Memoized alias lookups, including misses.
#[derive(Debug, Default)]
pub struct AliasCache {
    entries: HashMap<String, Option<String>>,
}

impl AliasCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the alias was never looked up; `Some(None)` if it was
    /// looked up and does not exist.
    pub fn get(&self, alias: &str) -> Option<Option<&str>> {
        self.entries.get(alias).map(Option::as_deref)
    }

    pub fn insert(&mut self, alias: &str, rid: Option<String>) {
        self.entries.insert(alias.to_owned(), rid);
    }

    pub fn forget(&mut self, alias: &str) {
        self.entries.remove(alias);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misses_are_remembered() {
        let mut cache = AliasCache::new();
        assert_eq!(cache.get("a"), None);
        cache.insert("a", None);
        assert_eq!(cache.get("a"), Some(None));
        cache.insert("a", Some("rid".into()));
        assert_eq!(cache.get("a"), Some(Some("rid")));
        cache.forget("a");
        assert!(cache.is_empty());
    }
}
