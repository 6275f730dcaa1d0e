/// Best-effort caches persisted in the key-value store
///
/// Nothing in here ever returns an error: storage failures are logged and
/// the caller carries on as if the cache were empty.
use tracing::warn;

use super::error::StorageError;
use super::store::KeyValueStore;

/// Storage key for the last fetched, sorted item order
pub const ITEM_ORDER_KEY: &str = "currentAssetOrder";

/// Storage key for the detail view's metadata sidebar flag
pub const SIDEBAR_OPEN_KEY: &str = "metadataSidebarOpen";

/// Ordered list of item IDs from the last successful fetch.
///
/// The grid writes it; the detail view reads it to find the neighbours of
/// the item being shown.
#[derive(Debug, Clone)]
pub struct ItemOrderCache<S> {
    store: S,
}

impl<S: KeyValueStore> ItemOrderCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn save(&self, ids: &[String]) {
        let result = serde_json::to_string(ids)
            .map_err(|source| StorageError::Encode {
                key: ITEM_ORDER_KEY.to_string(),
                source,
            })
            .and_then(|json| self.store.set(ITEM_ORDER_KEY, &json));

        if let Err(e) = result {
            warn!("⚠️  Error saving asset order: {}", e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(ITEM_ORDER_KEY) {
            warn!("⚠️  Error clearing asset order: {}", e);
        }
    }

    /// The cached order, or an empty list if nothing usable is stored
    pub fn load(&self) -> Vec<String> {
        let json = match self.store.get(ITEM_ORDER_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("⚠️  Error reading asset order: {}", e);
                return Vec::new();
            }
        };

        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("⚠️  Ignoring unreadable asset order: {}", e);
            Vec::new()
        })
    }

    /// (previous, next) around `id`; both None if `id` is not cached
    pub fn neighbors(&self, id: &str) -> (Option<String>, Option<String>) {
        let ids = self.load();
        let Some(index) = ids.iter().position(|cached| cached == id) else {
            return (None, None);
        };

        let previous = index.checked_sub(1).map(|i| ids[i].clone());
        let next = ids.get(index + 1).cloned();
        (previous, next)
    }
}

/// Whether the metadata sidebar in the detail view is open
#[derive(Debug, Clone)]
pub struct SidebarPreference<S> {
    store: S,
}

impl<S: KeyValueStore> SidebarPreference<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored flag; anything other than "true" (or a failing store) is closed
    pub fn load(&self) -> bool {
        match self.store.get(SIDEBAR_OPEN_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("⚠️  Error reading sidebar preference: {}", e);
                false
            }
        }
    }

    pub fn save(&self, open: bool) {
        if let Err(e) = self.store.set(SIDEBAR_OPEN_KEY, if open { "true" } else { "false" }) {
            warn!("⚠️  Error saving sidebar preference: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::MemoryStore;
    use std::rc::Rc;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_neighbors_after_save() {
        let cache = ItemOrderCache::new(MemoryStore::new());
        cache.save(&ids(&["id1", "id2", "id3"]));

        assert_eq!(
            cache.neighbors("id2"),
            (Some("id1".to_string()), Some("id3".to_string()))
        );
        assert_eq!(cache.neighbors("id1"), (None, Some("id2".to_string())));
        assert_eq!(cache.neighbors("id3"), (Some("id2".to_string()), None));
        assert_eq!(cache.neighbors("unknown"), (None, None));
    }

    #[test]
    fn test_clear_forgets_order() {
        let cache = ItemOrderCache::new(MemoryStore::new());
        cache.save(&ids(&["a", "b"]));
        cache.clear();

        assert!(cache.load().is_empty());
        assert_eq!(cache.neighbors("a"), (None, None));
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let store = Rc::new(MemoryStore::new());
        let cache = ItemOrderCache::new(Rc::clone(&store));
        cache.save(&ids(&["a", "b"]));

        store.set_unavailable(true);
        cache.save(&ids(&["c"]));
        cache.clear();
        assert!(cache.load().is_empty());

        // The failed writes left the earlier order untouched
        store.set_unavailable(false);
        assert_eq!(cache.load(), ids(&["a", "b"]));
    }

    #[test]
    fn test_corrupt_payload_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(ITEM_ORDER_KEY, "{not json").unwrap();

        let cache = ItemOrderCache::new(store);
        assert!(cache.load().is_empty());
        assert_eq!(cache.neighbors("b"), (None, None));
    }

    #[test]
    fn test_sidebar_preference() {
        let store = Rc::new(MemoryStore::new());
        let pref = SidebarPreference::new(Rc::clone(&store));
        assert!(!pref.load());

        pref.save(true);
        assert!(pref.load());
        assert_eq!(store.get(SIDEBAR_OPEN_KEY).unwrap().as_deref(), Some("true"));

        store.set_unavailable(true);
        pref.save(false);
        assert!(!pref.load());
    }
}
