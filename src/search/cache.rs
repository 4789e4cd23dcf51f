//! Fingerprint → result-list cache, namespaced by backend and config so a
//! cross-backend key collision can never poison another backend's results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use super::ranking::SearchResult;

/// Deterministic cache key: `(backend_id, backend_version,
/// normalized_query_fingerprint, embedding_policy)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn generate(
        backend_id: &str,
        backend_version: &str,
        normalized_query: &str,
        embedding_policy: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(backend_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(backend_version.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized_query.as_bytes());
        hasher.update([0u8]);
        hasher.update(embedding_policy.as_bytes());
        let digest = hasher.finalize();
        Self(format!(
            "{backend_id}:{backend_version}:{:x}",
            digest
        ))
    }
}

struct CacheEntry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

/// Thread-safe, TTL- and size-bounded cache. Single-writer-per-key via a
/// coarse mutex over the whole map — sufficient because the Orchestrator's
/// merge step is the only place results are written back.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
    max_entries: usize,
}

impl SearchCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchResult>> {
        let guard = self.inner.lock().expect("search cache mutex poisoned");
        guard.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() <= self.ttl {
                Some(entry.results.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, key: CacheKey, results: Vec<SearchResult>) {
        let mut guard = self.inner.lock().expect("search cache mutex poisoned");
        if guard.len() >= self.max_entries && !guard.contains_key(&key) {
            // Evict the oldest entry (LRU over insertion time; adequate for
            // a bounded per-query cache rather than a long-lived server cache).
            if let Some(oldest) = guard
                .iter()
                .min_by_key(|(_, v)| v.inserted_at)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&oldest);
            }
        }
        guard.insert(
            key,
            CacheEntry {
                results,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 512)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ranking::SearchResult;

    fn result(score: f64) -> SearchResult {
        SearchResult {
            title: "t".into(),
            url: "u".into(),
            snippet: "s".into(),
            backend: "b".into(),
            bm25: score,
            semantic_similarity: score,
            credibility: score,
            final_score: score,
        }
    }

    #[test]
    fn same_inputs_produce_same_key() {
        let a = CacheKey::generate("b", "v1", "query text", "none");
        let b = CacheKey::generate("b", "v1", "query text", "none");
        assert_eq!(a, b);
    }

    #[test]
    fn different_backends_never_collide() {
        let a = CacheKey::generate("b1", "v1", "query", "none");
        let b = CacheKey::generate("b2", "v1", "query", "none");
        assert_ne!(a, b);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = SearchCache::default();
        let key = CacheKey::generate("b", "v1", "q", "none");
        cache.put(key.clone(), vec![result(0.9)]);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = SearchCache::new(Duration::from_millis(0), 8);
        let key = CacheKey::generate("b", "v1", "q", "none");
        cache.put(key.clone(), vec![result(0.9)]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }
}
