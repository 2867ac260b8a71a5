//! Secondary indices derived from the entity table.

use crate::core::IndexKey;
use std::collections::{HashMap, HashSet};

pub(crate) type KeyExtractor<T> = Box<dyn Fn(&T) -> Option<IndexKey> + Send + Sync>;

/// Named key-to-id-set mapping, subordinate to the entity table.
///
/// The table is authoritative; an index is always re-derivable from it via
/// [`rebuild`](SecondaryIndex::rebuild), which is also the recovery
/// mechanism for any drift accumulated by incremental updates.
pub struct SecondaryIndex<T> {
    name: String,
    extract: KeyExtractor<T>,
    buckets: HashMap<IndexKey, HashSet<String>>,
}

impl<T> SecondaryIndex<T> {
    pub(crate) fn new(name: String, extract: KeyExtractor<T>) -> Self {
        Self {
            name,
            extract,
            buckets: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key this index derives from the entity, if any. Entities without a
    /// key are simply not indexed.
    pub(crate) fn key_of(&self, entity: &T) -> Option<IndexKey> {
        (self.extract)(entity)
    }

    pub(crate) fn add(&mut self, key: IndexKey, id: &str) {
        self.buckets.entry(key).or_default().insert(id.to_string());
    }

    pub(crate) fn remove(&mut self, key: &IndexKey, id: &str) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    pub(crate) fn lookup(&self, key: &IndexKey) -> Option<&HashSet<String>> {
        self.buckets.get(key)
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Discard the current buckets and repopulate from the given entries.
    pub(crate) fn rebuild<'a, I>(&mut self, entries: I)
    where
        T: 'a,
        I: Iterator<Item = (&'a String, &'a T)>,
    {
        self.clear();
        for (id, entity) in entries {
            if let Some(key) = self.key_of(entity) {
                self.add(key, id);
            }
        }
    }

    /// Number of indexed id memberships across all keys.
    pub fn len(&self) -> usize {
        self.buckets.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of distinct keys currently present.
    pub fn distinct_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Clone)]
    struct Marker {
        team: String,
    }

    fn team_index() -> SecondaryIndex<Marker> {
        SecondaryIndex::new(
            "team".to_string(),
            Box::new(|m: &Marker| Some(IndexKey::from(m.team.as_str()))),
        )
    }

    #[test]
    fn test_add_remove() {
        let mut index = team_index();
        index.add(IndexKey::from("home"), "1");
        index.add(IndexKey::from("home"), "2");

        let ids = index.lookup(&IndexKey::from("home")).unwrap();
        assert_eq!(ids.len(), 2);

        index.remove(&IndexKey::from("home"), "1");
        assert_eq!(index.lookup(&IndexKey::from("home")).unwrap().len(), 1);

        // Dropping the last member drops the bucket.
        index.remove(&IndexKey::from("home"), "2");
        assert!(index.lookup(&IndexKey::from("home")).is_none());
        assert_eq!(index.distinct_keys(), 0);
    }

    #[test]
    fn test_rebuild_from_table() {
        let mut table = BTreeMap::new();
        table.insert("1".to_string(), Marker { team: "home".to_string() });
        table.insert("2".to_string(), Marker { team: "away".to_string() });
        table.insert("3".to_string(), Marker { team: "home".to_string() });

        let mut index = team_index();
        index.add(IndexKey::from("stale"), "99");
        index.rebuild(table.iter());

        assert_eq!(index.len(), 3);
        assert_eq!(index.distinct_keys(), 2);
        assert!(index.lookup(&IndexKey::from("stale")).is_none());
        assert_eq!(index.lookup(&IndexKey::from("home")).unwrap().len(), 2);
    }
}
