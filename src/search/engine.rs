//! Multi-backend dispatch, embedding, and ranking fusion.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::metrics::Metrics;

use super::cache::{CacheKey, SearchCache};
use super::ranking::{normalize_bm25, sort_ranked, SearchResult, Weights};

/// A raw hit returned by a backend before scoring/fusion.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub bm25: f64,
    pub domain: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub offset: usize,
    pub backend_version: String,
}

/// Outbound retrieval capability. Implementations live outside this core.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn id(&self) -> &str;
    async fn query(&self, query: &str, options: &SearchOptions) -> Result<Vec<RawResult>>;
}

/// Outbound embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.5;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.5;
    }
    ((dot / (na * nb)) as f64).clamp(0.0, 1.0)
}

fn domain_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(url)
        .to_string()
}

/// Dispatches to every enabled backend, fuses scores, and caches per
/// backend fingerprint.
pub struct SearchEngine {
    backends: Vec<Box<dyn SearchBackend>>,
    embedder: Option<Box<dyn Embedder>>,
    cache: SearchCache,
    domain_authority: std::collections::HashMap<String, f64>,
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

impl SearchEngine {
    pub fn new(backends: Vec<Box<dyn SearchBackend>>, embedder: Option<Box<dyn Embedder>>) -> Self {
        Self {
            backends,
            embedder,
            cache: SearchCache::new(Duration::from_secs(300), 2048),
            domain_authority: std::collections::HashMap::new(),
        }
    }

    pub fn with_cache(mut self, cache: SearchCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_domain_authority(mut self, table: std::collections::HashMap<String, f64>) -> Self {
        self.domain_authority = table;
        self
    }

    fn credibility_for(&self, url: &str) -> f64 {
        self.domain_authority
            .get(&domain_of(url))
            .copied()
            .unwrap_or(0.5)
    }

    /// `external_lookup`: a pure function of cache + backend outputs + config.
    /// Repeated calls with the same `(query, config)` are byte-identical and
    /// invoke each backend at most once per fingerprint (P6). `metrics` is the
    /// caller's per-query handle, not one owned by the engine — the engine is
    /// typically constructed once and shared across many queries, so cache
    /// hit/miss counts are recorded against whichever query triggered them.
    pub async fn external_lookup(
        &self,
        query: &str,
        config: &SearchConfig,
        metrics: &Metrics,
    ) -> Result<Vec<SearchResult>> {
        let normalized = normalize_query(query);
        let weights = Weights::normalized(
            config.bm25_weight,
            config.semantic_similarity_weight,
            config.source_credibility_weight,
        )?;

        let query_embedding = if config.hybrid_query {
            match &self.embedder {
                Some(embedder) => Some(embedder.embed(&normalized).await?),
                None => None,
            }
        } else {
            None
        };
        let embedding_policy = if query_embedding.is_some() { "hybrid" } else { "none" };

        let enabled = |id: &str| config.backends.is_empty() || config.backends.iter().any(|b| b == id);
        let backend_version = "v1";

        let mut results = Vec::new();
        for backend in &self.backends {
            if !enabled(backend.id()) {
                continue;
            }
            let key = CacheKey::generate(backend.id(), backend_version, &normalized, embedding_policy);
            let fused = match self.cache.get(&key) {
                Some(cached) => {
                    metrics.record_cache_hit();
                    cached
                }
                None => {
                    metrics.record_cache_miss();
                    let options = SearchOptions {
                        max_results: 20,
                        offset: 0,
                        backend_version: backend_version.to_string(),
                    };
                    let raws = backend.query(&normalized, &options).await?;
                    let fused = self
                        .fuse_backend_results(&raws, &query_embedding, &weights, backend.id())
                        .await?;
                    self.cache.put(key, fused.clone());
                    fused
                }
            };
            results.extend(fused);
        }
        sort_ranked(&mut results);
        Ok(results)
    }

    async fn fuse_backend_results(
        &self,
        raws: &[RawResult],
        query_embedding: &Option<Vec<f32>>,
        weights: &Weights,
        backend_id: &str,
    ) -> Result<Vec<SearchResult>> {
        let bm25_raw: Vec<f64> = raws.iter().map(|r| r.bm25).collect();
        let bm25_norm = normalize_bm25(&bm25_raw);

        let mut out = Vec::with_capacity(raws.len());
        for (raw, bm25) in raws.iter().zip(bm25_norm) {
            let sem_sim = match (&self.embedder, query_embedding) {
                (Some(embedder), Some(q)) => {
                    let doc_embedding = embedder.embed(&raw.snippet).await?;
                    cosine_similarity(q, &doc_embedding)
                }
                _ => 0.5,
            };
            let cred = self.credibility_for(&raw.url);
            let final_score = weights.combine(bm25, sem_sim, cred);
            out.push(SearchResult {
                title: raw.title.clone(),
                url: raw.url.clone(),
                snippet: raw.snippet.clone(),
                backend: backend_id.to_string(),
                bm25,
                semantic_similarity: sem_sim,
                credibility: cred,
                final_score,
            });
        }
        sort_ranked(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        id: String,
    }

    #[async_trait]
    impl SearchBackend for CountingBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn query(&self, _query: &str, _options: &SearchOptions) -> Result<Vec<RawResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RawResult {
                    title: "a".into(),
                    url: "https://a.example/x".into(),
                    snippet: "alpha".into(),
                    bm25: 0.9,
                    domain: "a.example".into(),
                },
                RawResult {
                    title: "b".into(),
                    url: "https://b.example/y".into(),
                    snippet: "beta".into(),
                    bm25: 0.2,
                    domain: "b.example".into(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn repeated_lookup_invokes_backend_once_per_fingerprint() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            calls: calls.clone(),
            id: "test".into(),
        };
        let engine = SearchEngine::new(vec![Box::new(backend)], None);
        let config = SearchConfig {
            backends: vec!["test".into()],
            hybrid_query: false,
            semantic_similarity_weight: 0.3,
            bm25_weight: 0.6,
            source_credibility_weight: 0.1,
        };
        let metrics = Metrics::new();
        let first = engine.external_lookup("hello world", &config, &metrics).await.unwrap();
        let second = engine.external_lookup("hello world", &config, &metrics).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), second.len());
        let snap = metrics.snapshot();
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.cache_hits, 1);
    }

    #[tokio::test]
    async fn results_are_ranked_non_increasing() {
        let backend = CountingBackend {
            calls: Arc::new(AtomicUsize::new(0)),
            id: "test".into(),
        };
        let engine = SearchEngine::new(vec![Box::new(backend)], None);
        let config = SearchConfig {
            backends: vec!["test".into()],
            hybrid_query: false,
            semantic_similarity_weight: 0.3,
            bm25_weight: 0.6,
            source_credibility_weight: 0.1,
        };
        let results = engine.external_lookup("q", &config, &Metrics::new()).await.unwrap();
        for w in results.windows(2) {
            assert!(w[0].final_score >= w[1].final_score);
        }
    }
}
