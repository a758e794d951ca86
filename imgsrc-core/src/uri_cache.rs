//! Presence-only registry of URIs known to have loaded.
//!
//! No bytes are stored. Entries are reference counted because the same URI
//! can be displayed by several consumers at once; an entry is only evicted
//! once nobody references it.

use crate::config::DEFAULT_MAX_CACHE_ENTRIES;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

const DATA_URI_PREFIX: &str = "data:";

#[derive(Debug, Clone, Copy)]
struct UriCacheEntry {
    last_used: Instant,
    // Orders entries touched within the same `Instant`.
    sequence: u64,
    ref_count: i64,
}

impl UriCacheEntry {
    fn recency(&self) -> (Instant, u64) {
        (self.last_used, self.sequence)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, UriCacheEntry>,
    sequence: u64,
}

impl Entries {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Debug)]
pub struct UriCache {
    max_entries: usize,
    entries: Mutex<Entries>,
}

impl Default for UriCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_ENTRIES)
    }
}

impl UriCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Data URIs are always present; anything else needs a live entry.
    pub fn has(&self, uri: &str) -> bool {
        uri.starts_with(DATA_URI_PREFIX)
            || self.entries.lock().map.contains_key(uri)
    }

    pub fn add(&self, uri: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let sequence = entries.next_sequence();
        match entries.map.get_mut(uri) {
            Some(entry) => {
                entry.last_used = now;
                entry.sequence = sequence;
                entry.ref_count += 1;
                log::trace!("uri cache: {uri} refs={}", entry.ref_count);
            }
            None => {
                entries.map.insert(
                    uri.to_string(),
                    UriCacheEntry {
                        last_used: now,
                        sequence,
                        ref_count: 1,
                    },
                );
                log::trace!("uri cache: inserted {uri}");
            }
        }
    }

    /// Drops one reference. Unknown URIs are ignored; cleanup always runs.
    pub fn remove(&self, uri: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.map.get_mut(uri) {
            entry.ref_count -= 1;
        }
        self.cleanup(&mut entries);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().map.is_empty()
    }

    pub fn ref_count(&self, uri: &str) -> Option<i64> {
        self.entries.lock().map.get(uri).map(|entry| entry.ref_count)
    }

    /// Evicts the least recently used unreferenced entry when over the cap.
    /// If every entry is still referenced the cache stays over the cap.
    fn cleanup(&self, entries: &mut Entries) {
        if entries.map.len() <= self.max_entries {
            return;
        }

        let victim = entries
            .map
            .iter()
            .filter(|(_, entry)| entry.ref_count == 0)
            .min_by_key(|(_, entry)| entry.recency())
            .map(|(uri, _)| uri.clone());

        match victim {
            Some(uri) => {
                entries.map.remove(&uri);
                log::trace!(
                    "uri cache: evicted {uri} ({} entries remain)",
                    entries.map.len()
                );
            }
            None => log::debug!(
                "uri cache over capacity ({} > {}) with every entry referenced",
                entries.map.len(),
                self.max_entries
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(i: usize) -> String {
        format!("https://cdn.test/{i}.png")
    }

    #[test]
    fn data_uris_are_always_present() {
        let cache = UriCache::new(4);
        assert!(cache.has("data:image/png;base64,AAAA"));
        assert!(cache.is_empty());
        assert!(!cache.has("https://cdn.test/a.png"));
    }

    #[test]
    fn add_and_remove_track_references() {
        let cache = UriCache::new(4);
        cache.add("a");
        cache.add("a");
        assert_eq!(cache.ref_count("a"), Some(2));
        cache.remove("a");
        assert_eq!(cache.ref_count("a"), Some(1));
        assert!(cache.has("a"));
    }

    #[test]
    fn removing_unknown_uri_is_a_no_op() {
        let cache = UriCache::new(4);
        cache.remove("never-added");
        assert!(cache.is_empty());
        assert_eq!(cache.ref_count("never-added"), None);
    }

    #[test]
    fn evicts_least_recently_used_unreferenced_entry() {
        let cache = UriCache::new(DEFAULT_MAX_CACHE_ENTRIES);
        for i in 0..=DEFAULT_MAX_CACHE_ENTRIES {
            cache.add(&uri(i));
            cache.remove(&uri(i));
        }

        assert_eq!(cache.len(), DEFAULT_MAX_CACHE_ENTRIES);
        assert!(!cache.has(&uri(0)));
        assert!(cache.has(&uri(1)));
        assert!(cache.has(&uri(DEFAULT_MAX_CACHE_ENTRIES)));
    }

    #[test]
    fn touching_an_entry_protects_it_from_eviction() {
        let cache = UriCache::new(2);
        cache.add("old");
        cache.add("mid");
        // Re-adding bumps recency, then drop the extra reference.
        cache.add("old");
        cache.remove("old");
        cache.remove("old");
        cache.remove("mid");
        cache.add("new");
        cache.remove("new");

        assert!(cache.has("old"));
        assert!(!cache.has("mid"));
        assert!(cache.has("new"));
    }

    #[test]
    fn referenced_entries_are_never_evicted() {
        let cache = UriCache::new(2);
        cache.add("a");
        cache.add("b");
        cache.add("c");
        cache.remove("missing");
        assert_eq!(cache.len(), 3);

        cache.remove("b");
        assert_eq!(cache.len(), 2);
        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn has_does_not_trigger_cleanup() {
        let cache = UriCache::new(1);
        cache.add("a");
        cache.add("b");
        assert!(cache.has("a"));
        assert!(cache.has("b"));
        assert_eq!(cache.len(), 2);
    }
}
