//! Candidate pool shared by the discovery phases.
//!
//! Each phase folds its results into the same [`CandidatePool`]. Candidates
//! are created once per blogger id and only merged into afterwards: ranks are
//! appended, hit queries unioned, and posts appended when their link is new.
//! The locality counter moves only with a newly stored post, so replaying a
//! phase never inflates it.

use crate::blogger_id::{blog_url_from_id, blogger_id_from_item};
use crate::models::{CandidateBlogger, Locality, SearchResultItem};
use crate::utils::{normalize_whitespace, query_key};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Discovery phase, with its per-query result cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Seed,
    RegionPower,
    Broad,
}

impl Phase {
    /// Results considered per query; `None` means all.
    pub fn result_cap(self) -> Option<usize> {
        match self {
            Phase::Seed => None,
            Phase::RegionPower => Some(10),
            Phase::Broad => Some(15),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Seed => "seed",
            Phase::RegionPower => "region_power",
            Phase::Broad => "broad",
        }
    }
}

#[derive(Debug, Default)]
pub struct CandidatePool {
    candidates: BTreeMap<String, CandidateBlogger>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one phase's results into the pool, walking `queries` in order.
    ///
    /// Returns the number of new candidates.
    pub fn absorb(
        &mut self,
        phase: Phase,
        queries: &[String],
        results: &HashMap<String, Vec<SearchResultItem>>,
        locality: &Locality,
    ) -> usize {
        let before = self.candidates.len();
        for query in queries {
            let Some(items) = results.get(&query_key(query)) else {
                continue;
            };
            let query = normalize_whitespace(query);
            let cap = phase.result_cap().unwrap_or(items.len());
            for (rank0, item) in items.iter().take(cap).enumerate() {
                self.absorb_item(&query, rank0 as u32 + 1, item, locality);
            }
        }
        let created = self.candidates.len() - before;
        debug!(phase = phase.as_str(), created, total = self.candidates.len(), "phase absorbed");
        created
    }

    fn absorb_item(&mut self, query: &str, rank: u32, item: &SearchResultItem, locality: &Locality) {
        let Some(id) = blogger_id_from_item(item) else {
            return;
        };
        let candidate = self
            .candidates
            .entry(id)
            .or_insert_with_key(|id| CandidateBlogger::new(id, blog_url_from_id(id)));

        candidate.ranks.push(rank);
        candidate.queries_hit.insert(query.to_string());

        if item.link.is_empty() || candidate.has_post(&item.link) {
            return;
        }
        if candidate.blogger_name.is_none() {
            candidate.blogger_name = item.author_name.clone();
        }
        if locality.matches(&item.text()) {
            candidate.local_hits += 1;
        }
        candidate.posts.push(item.clone());
    }

    /// Set each candidate's hit count for `phase` to the number of that
    /// phase's queries it appeared in. Replaces any previous count.
    pub fn record_phase_hits(&mut self, phase: Phase, queries: &[String]) {
        let phase_queries: HashSet<String> = queries.iter().map(|q| normalize_whitespace(q)).collect();
        for candidate in self.candidates.values_mut() {
            let hits = candidate
                .queries_hit
                .iter()
                .filter(|q| phase_queries.contains(*q))
                .count();
            match phase {
                Phase::RegionPower => candidate.region_power_hits = hits,
                Phase::Broad => candidate.broad_query_hits = hits,
                Phase::Seed => {}
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, blogger_id: &str) -> Option<&CandidateBlogger> {
        self.candidates.get(blogger_id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Consume the pool in id order.
    pub fn into_candidates(self) -> Vec<CandidateBlogger> {
        self.candidates.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::mock::hit;

    fn locality() -> Locality {
        Locality {
            region: "강남".into(),
            address_tokens: vec!["역삼동".into()],
        }
    }

    fn results(pairs: &[(&str, Vec<SearchResultItem>)]) -> HashMap<String, Vec<SearchResultItem>> {
        pairs.iter().map(|(q, items)| (q.to_string(), items.clone())).collect()
    }

    #[test]
    fn test_ranks_queries_and_locality() {
        let mut pool = CandidatePool::new();
        let res = results(&[
            ("q1", vec![hit("a", "1", "강남 안경 후기"), hit("b", "2", "홍대 안경")]),
            ("q2", vec![hit("b", "3", "역삼동 안경원")]),
        ]);
        let created = pool.absorb(Phase::Seed, &["q1".into(), "q2".into()], &res, &locality());
        assert_eq!(created, 2);

        let a = pool.get("a").unwrap();
        assert_eq!(a.ranks, vec![1]);
        assert_eq!(a.local_hits, 1);
        assert_eq!(a.blog_url, "https://blog.naver.com/a");
        assert_eq!(a.blogger_name.as_deref(), Some("a"));

        let b = pool.get("b").unwrap();
        assert_eq!(b.ranks, vec![2, 1]);
        assert_eq!(b.queries_hit.len(), 2);
        assert_eq!(b.posts.len(), 2);
        assert_eq!(b.local_hits, 1);
    }

    #[test]
    fn test_replaying_phase_does_not_duplicate_posts_or_locality() {
        let mut pool = CandidatePool::new();
        let res = results(&[("q", vec![hit("a", "1", "강남 맛집"), hit("a", "2", "강남 카페")])]);
        let queries = vec!["q".to_string()];
        pool.absorb(Phase::Seed, &queries, &res, &locality());
        pool.absorb(Phase::Seed, &queries, &res, &locality());

        let a = pool.get("a").unwrap();
        assert_eq!(a.posts.len(), 2);
        assert_eq!(a.local_hits, 2);
        assert_eq!(a.queries_hit.len(), 1);
    }

    #[test]
    fn test_phase_caps() {
        let items: Vec<SearchResultItem> = (0..20).map(|i| hit(&format!("u{i:02}"), "1", "t")).collect();
        let res = results(&[("q", items)]);
        let queries = vec!["q".to_string()];

        let mut pool = CandidatePool::new();
        pool.absorb(Phase::RegionPower, &queries, &res, &locality());
        assert_eq!(pool.len(), 10);
        pool.absorb(Phase::Broad, &queries, &res, &locality());
        assert_eq!(pool.len(), 15);
        pool.absorb(Phase::Seed, &queries, &res, &locality());
        assert_eq!(pool.len(), 20);
    }

    #[test]
    fn test_unidentifiable_results_skipped() {
        let mut item = hit("a", "1", "t");
        item.author_link = None;
        item.link = "https://cafe.naver.com/x/1".into();
        let res = results(&[("q", vec![item])]);
        let mut pool = CandidatePool::new();
        pool.absorb(Phase::Seed, &["q".into()], &res, &locality());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_phase_hits_recomputed_per_phase() {
        let mut pool = CandidatePool::new();
        let res = results(&[
            ("s", vec![hit("a", "1", "t")]),
            ("r1", vec![hit("a", "2", "t")]),
            ("r2", vec![hit("a", "3", "t")]),
            ("b1", vec![hit("a", "4", "t")]),
        ]);
        pool.absorb(Phase::Seed, &["s".into()], &res, &locality());
        let region: Vec<String> = vec!["r1".into(), "r2".into()];
        pool.absorb(Phase::RegionPower, &region, &res, &locality());
        pool.record_phase_hits(Phase::RegionPower, &region);
        assert_eq!(pool.get("a").unwrap().region_power_hits, 2);

        let broad: Vec<String> = vec!["b1".into()];
        pool.absorb(Phase::Broad, &broad, &res, &locality());
        pool.record_phase_hits(Phase::Broad, &broad);
        pool.record_phase_hits(Phase::RegionPower, &region);
        let a = pool.get("a").unwrap();
        assert_eq!(a.region_power_hits, 2);
        assert_eq!(a.broad_query_hits, 1);
        assert_eq!(a.queries_hit.len(), 4);
    }
}
