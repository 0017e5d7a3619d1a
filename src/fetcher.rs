//! Cached, concurrency-bounded batch search.
//!
//! [`BatchFetcher::fetch`] answers a list of queries with one result list per
//! query. Queries already in the run's [`QueryCache`] cost no provider call;
//! misses fan out over at most `concurrency` in-flight searches and land in
//! the cache as each one completes. A failed query answers with an empty list
//! and stays out of the cache, so a later phase may try it again.
//!
//! Queries are identified by [`query_key`], so spacing and case variants of
//! one query share a cache entry and a result slot.

use crate::models::SearchResultItem;
use crate::search::SearchProvider;
use crate::utils::{dedupe_keep_order, query_key, truncate_for_log};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::pin::pin;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Search results of one analysis run, keyed by (query key, limit).
#[derive(Debug, Default, Clone)]
pub struct QueryCache {
    entries: HashMap<(String, u32), Vec<SearchResultItem>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &str, limit: u32) -> Option<&Vec<SearchResultItem>> {
        self.entries.get(&(query_key(query), limit))
    }

    pub fn insert(&mut self, query: &str, limit: u32, items: Vec<SearchResultItem>) {
        self.entries.insert((query_key(query), limit), items);
    }

    #[cfg(test)]
    pub fn contains(&self, query: &str, limit: u32) -> bool {
        self.get(query, limit).is_some()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Call accounting for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Distinct query keys asked for.
    pub requested: usize,
    pub cache_hits: usize,
    /// Provider calls actually made (successful or not).
    pub issued: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One entry per distinct input query, keyed by [`query_key`].
    pub results: HashMap<String, Vec<SearchResultItem>>,
    pub stats: FetchStats,
}

impl BatchOutcome {
    /// Results for `query`, empty when the query was not part of the batch.
    pub fn items(&self, query: &str) -> &[SearchResultItem] {
        self.results
            .get(&query_key(query))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Fans a batch of queries out to a [`SearchProvider`].
///
/// Holds no per-run state; the caller owns the [`QueryCache`] and passes it to
/// every [`BatchFetcher::fetch`] of the run.
#[derive(Debug)]
pub struct BatchFetcher<P> {
    /// Provider that answers cache misses, usually wrapped in retry.
    provider: P,
    /// Maximum number of provider calls in flight at once. Never zero.
    concurrency: usize,
}

impl<P> BatchFetcher<P>
where
    P: SearchProvider,
{
    /// Create a fetcher over `provider`.
    ///
    /// # Arguments
    ///
    /// * `provider` - The search backend for cache misses.
    /// * `concurrency` - In-flight call limit; `0` is treated as `1`.
    ///
    /// # Returns
    ///
    /// A fetcher ready to serve any number of batches.
    pub fn new(provider: P, concurrency: usize) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
        }
    }

    #[instrument(level = "info", skip_all, fields(queries = queries.len(), limit = limit))]
    pub async fn fetch(&self, cache: &mut QueryCache, queries: &[String], limit: u32) -> BatchOutcome {
        let t0 = Instant::now();
        let distinct = dedupe_keep_order(queries);
        let mut outcome = BatchOutcome {
            stats: FetchStats {
                requested: distinct.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut misses = Vec::new();
        for query in distinct {
            match cache.get(&query, limit) {
                Some(items) => {
                    outcome.stats.cache_hits += 1;
                    outcome.results.insert(query_key(&query), items.clone());
                }
                None => misses.push(query),
            }
        }

        let provider = &self.provider;
        let mut answers = pin!(
            stream::iter(misses)
                .map(|query| async move {
                    let answer = provider.search(&query, limit).await;
                    (query, answer)
                })
                .buffer_unordered(self.concurrency)
        );

        while let Some((query, answer)) = answers.next().await {
            outcome.stats.issued += 1;
            match answer {
                Ok(items) => {
                    debug!(query = %truncate_for_log(&query, 80), count = items.len(), "query answered");
                    cache.insert(&query, limit, items.clone());
                    outcome.results.insert(query_key(&query), items);
                }
                Err(e) => {
                    warn!(query = %truncate_for_log(&query, 80), error = %e, "query failed; using empty result");
                    outcome.stats.failed += 1;
                    outcome.results.insert(query_key(&query), Vec::new());
                }
            }
        }

        info!(
            requested = outcome.stats.requested,
            cache_hits = outcome.stats.cache_hits,
            issued = outcome.stats.issued,
            failed = outcome.stats.failed,
            elapsed_ms = t0.elapsed().as_millis(),
            "batch fetched"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::mock::{MockProvider, hit};

    fn queries(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn test_one_entry_per_query() {
        let mock = MockProvider::new().with_results("a", vec![hit("x", "1", "t")]);
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        let out = fetcher.fetch(&mut cache, &queries(&["a", "b", "c"]), 10).await;
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.items("a").len(), 1);
        assert!(out.items("b").is_empty());
        assert_eq!(out.stats.issued, 3);
    }

    #[tokio::test]
    async fn test_cached_query_costs_no_call() {
        let mock = MockProvider::new().with_results("a", vec![hit("x", "1", "t")]);
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        cache.insert("a", 10, vec![hit("cached", "9", "t")]);

        let out = fetcher.fetch(&mut cache, &queries(&["a", "b"]), 10).await;
        assert_eq!(mock.calls_for("a"), 0);
        assert_eq!(mock.calls_for("b"), 1);
        assert_eq!(out.stats.cache_hits, 1);
        assert_eq!(out.stats.issued, 1);
        assert_eq!(out.items("a")[0].author_name.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_limit() {
        let mock = MockProvider::new();
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        fetcher.fetch(&mut cache, &queries(&["a"]), 10).await;
        fetcher.fetch(&mut cache, &queries(&["a"]), 30).await;
        fetcher.fetch(&mut cache, &queries(&["a"]), 30).await;
        assert_eq!(mock.calls_for("a"), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_empty_and_not_cached() {
        let mock = MockProvider::new()
            .with_results("ok", vec![hit("x", "1", "t")])
            .failing("bad");
        let fetcher = BatchFetcher::new(&mock, 2);
        let mut cache = QueryCache::new();

        let out = fetcher.fetch(&mut cache, &queries(&["ok", "bad"]), 10).await;
        assert!(out.items("bad").is_empty());
        assert_eq!(out.items("ok").len(), 1);
        assert_eq!(out.stats.failed, 1);
        assert!(!cache.contains("bad", 10));
        assert!(cache.contains("ok", 10));

        fetcher.fetch(&mut cache, &queries(&["bad"]), 10).await;
        assert_eq!(mock.calls_for("bad"), 2);
    }

    #[tokio::test]
    async fn test_duplicates_and_spacing_collapse() {
        let mock = MockProvider::new();
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        let out = fetcher
            .fetch(&mut cache, &queries(&["강남  안경", "강남 안경", " 강남 안경 "]), 10)
            .await;
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.stats.requested, 1);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_case_variants_share_one_call_and_cache_entry() {
        let mock = MockProvider::new().with_results("강남 PT 추천", vec![hit("x", "1", "t")]);
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        let out = fetcher
            .fetch(&mut cache, &queries(&["강남 PT 추천", "강남 pt 추천"]), 10)
            .await;
        assert_eq!(out.stats.requested, 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(out.items("강남 pt  추천").len(), 1);

        let again = fetcher.fetch(&mut cache, &queries(&["강남 Pt 추천"]), 10).await;
        assert_eq!(again.stats.cache_hits, 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_order_preserved() {
        let items = vec![hit("a", "1", "t1"), hit("b", "2", "t2"), hit("c", "3", "t3")];
        let mock = MockProvider::new().with_results("q", items.clone());
        let fetcher = BatchFetcher::new(&mock, 5);
        let mut cache = QueryCache::new();
        let out = fetcher.fetch(&mut cache, &queries(&["q"]), 10).await;
        assert_eq!(out.items("q"), items.as_slice());
    }
}
