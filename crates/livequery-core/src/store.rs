//! In-memory system of record for computed results.
//!
//! Two independent maps, one for page results and one for shared
//! results. Entries are overwritten by later pushes and never evicted.
//! The store does no I/O and has no locking of its own; the
//! [`Hub`](crate::hub::Hub) serializes access to it.

use std::collections::{BTreeMap, HashSet};

use crate::protocol::ResultEntry;

/// Page and shared results keyed by id.
///
/// Invariant: every stored entry's `id` equals its key.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    pages: BTreeMap<String, ResultEntry>,
    shared: BTreeMap<String, ResultEntry>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Result for a page path, if one has been stored.
    pub fn page(&self, path: &str) -> Option<&ResultEntry> {
        self.pages.get(path)
    }

    /// Store a page result, replacing any previous one.
    ///
    /// Returns the replaced entry.
    pub fn set_page(&mut self, entry: ResultEntry) -> Option<ResultEntry> {
        self.pages.insert(entry.id.clone(), entry)
    }

    /// Shared result for a hash, if one has been stored.
    pub fn shared(&self, id: &str) -> Option<&ResultEntry> {
        self.shared.get(id)
    }

    /// Store a shared result, replacing any previous one.
    ///
    /// Returns the replaced entry.
    pub fn set_shared(&mut self, entry: ResultEntry) -> Option<ResultEntry> {
        self.shared.insert(entry.id.clone(), entry)
    }

    /// Fold loaded shared results into the store.
    ///
    /// Existing keys are never overwritten: anything already pushed fresh
    /// wins over what was read from disk. Returns how many entries were
    /// added.
    pub fn merge_shared(&mut self, entries: impl IntoIterator<Item = ResultEntry>) -> usize {
        let mut added: usize = 0;
        for entry in entries {
            if !self.shared.contains_key(&entry.id) {
                self.shared.insert(entry.id.clone(), entry);
                added = added.saturating_add(1);
            }
        }
        added
    }

    /// Ids of all stored shared results.
    pub fn shared_ids(&self) -> HashSet<String> {
        self.shared.keys().cloned().collect()
    }

    /// All stored page results.
    pub fn page_entries(&self) -> impl Iterator<Item = &ResultEntry> {
        self.pages.values()
    }

    /// All stored shared results.
    pub fn shared_entries(&self) -> impl Iterator<Item = &ResultEntry> {
        self.shared.values()
    }

    /// Number of stored page results.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of stored shared results.
    pub fn shared_count(&self) -> usize {
        self.shared.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_page_overwrites() {
        let mut store = ResultStore::new();
        assert!(store.set_page(ResultEntry::new("/a", json!(1))).is_none());
        let previous = store.set_page(ResultEntry::new("/a", json!(2))).unwrap();
        assert_eq!(previous.result, json!(1));
        assert_eq!(store.page("/a").unwrap().result, json!(2));
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn page_and_shared_maps_are_independent() {
        let mut store = ResultStore::new();
        store.set_page(ResultEntry::new("x", json!("page")));
        store.set_shared(ResultEntry::new("x", json!("shared")));
        assert_eq!(store.page("x").unwrap().result, json!("page"));
        assert_eq!(store.shared("x").unwrap().result, json!("shared"));
    }

    #[test]
    fn merge_keeps_fresh_entries() {
        let mut store = ResultStore::new();
        store.set_shared(ResultEntry::new("h1", json!("fresh")));

        let added = store.merge_shared([
            ResultEntry::new("h1", json!("stale")),
            ResultEntry::new("h2", json!("loaded")),
        ]);

        assert_eq!(added, 1);
        assert_eq!(store.shared("h1").unwrap().result, json!("fresh"));
        assert_eq!(store.shared("h2").unwrap().result, json!("loaded"));
        assert_eq!(store.shared_ids().len(), 2);
    }

    #[test]
    fn missing_lookups_are_absent() {
        let store = ResultStore::new();
        assert!(store.page("/nope").is_none());
        assert!(store.shared("nope").is_none());
        assert_eq!(store.page_entries().count(), 0);
        assert_eq!(store.shared_entries().count(), 0);
    }
}
