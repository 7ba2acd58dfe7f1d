use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, gauge};

use super::keys::PageKey;
use super::lock::{rw_read, rw_write};
use crate::infra::telemetry::{PAGE_CACHE_CLEAR, PAGE_CACHE_ENTRIES, PAGE_CACHE_HIT, PAGE_CACHE_MISS};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug)]
struct Entry {
    page: CachedPage,
    stored_at: Instant,
}

/// Key-value store with a single TTL and no other eviction.
#[derive(Debug)]
pub struct PageCache {
    ttl: Duration,
    entries: RwLock<HashMap<PageKey, Entry>>,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if self.is_fresh(entry, now) => {
                    counter!(PAGE_CACHE_HIT).increment(1);
                    return Some(entry.page.clone());
                }
                Some(_) => {}
                None => {
                    counter!(PAGE_CACHE_MISS).increment(1);
                    return None;
                }
            }
        }

        // Expired: drop it unless a concurrent writer already refreshed it.
        let mut entries = rw_write(&self.entries, SOURCE, "expire");
        if entries
            .get(key)
            .is_some_and(|entry| !self.is_fresh(entry, now))
        {
            entries.remove(key);
            gauge!(PAGE_CACHE_ENTRIES).set(entries.len() as f64);
        }
        counter!(PAGE_CACHE_MISS).increment(1);
        None
    }

    /// Store `page`, dropping any entries that have already expired.
    pub fn put(&self, key: PageKey, page: CachedPage) {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        entries.retain(|_, entry| self.is_fresh(entry, now));
        entries.insert(
            key,
            Entry {
                page,
                stored_at: now,
            },
        );
        gauge!(PAGE_CACHE_ENTRIES).set(entries.len() as f64);
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let dropped = entries.len();
        entries.clear();
        counter!(PAGE_CACHE_CLEAR).increment(1);
        gauge!(PAGE_CACHE_ENTRIES).set(0.0);
        dropped
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) < self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn page(body: &'static str) -> CachedPage {
        CachedPage {
            status: 200,
            headers: vec![("content-type".into(), "text/html; charset=utf-8".into())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn fresh_entries_are_served_until_cleared() {
        let cache = PageCache::new(Duration::from_secs(60));
        let key = PageKey::new(None, "/", "");

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), page("first"));
        assert_eq!(cache.get(&key).expect("cached").body, "first");

        assert_eq!(cache.clear(), 1);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = PageCache::new(Duration::ZERO);
        let key = PageKey::new(Some(1), "/", "page=2");
        cache.put(key.clone(), page("stale"));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn expired_entries_are_swept_on_write() {
        let cache = PageCache::new(Duration::ZERO);
        for page_number in 2..50 {
            let key = PageKey::new(None, "/", &format!("page={page_number}"));
            cache.put(key, page("stale"));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookups_emit_hit_and_miss_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let cache = PageCache::new(Duration::from_secs(60));
            let key = PageKey::new(None, "/", "");
            let _ = cache.get(&key);
            cache.put(key.clone(), page("body"));
            let _ = cache.get(&key);
            let _ = cache.get(&key);
        });

        let counters: HashMap<String, u64> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(count) => Some((key.key().name().to_string(), count)),
                _ => None,
            })
            .collect();

        assert_eq!(counters.get(PAGE_CACHE_HIT), Some(&2));
        assert_eq!(counters.get(PAGE_CACHE_MISS), Some(&1));
    }
}
