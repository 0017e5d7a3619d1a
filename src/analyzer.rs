//! Discovery orchestration.
//!
//! [`BloggerAnalyzer::run_discovery`] runs one analysis for a store:
//!
//! 1. **Seed**: narrow category/region queries, all results
//! 2. **Region power**: popular neighbouring categories, top 10 per query
//! 3. **Broad**: region-anchored adjacent queries, top 15 per query
//! 4. **Scoring**: bias rates and base score, sorted best first
//! 5. **Exposure**: the ten verification keywords, best rank per blogger
//! 6. **Saving**: profiles and facts for the top candidates, expired facts
//!    pruned, one commit
//!
//! Every search goes through one run-scoped [`QueryCache`]. The verification
//! counts are checked before anything is written, so a drifted run leaves the
//! store untouched.

use crate::aggregator::{CandidatePool, Phase};
use crate::blogger_id::blogger_id_from_item;
use crate::config::{Settings, Vocabulary};
use crate::error::{Error, Result};
use crate::fetcher::{BatchFetcher, QueryCache};
use crate::keywords::{QueryPlan, VERIFICATION_KEYWORDS};
use crate::models::{CandidateBlogger, CandidateProfile, ExposureFact, ExposureHit, Locality, SearchResultItem, StoreProfile};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::scoring::{
    EXPOSED_MAX_RANK, PAGE1_MAX_RANK, base_score, calc_food_bias, calc_sponsor_signal, keyword_match_ratio,
    strength_points,
};
use crate::search::SearchProvider;
use crate::store::ExposureStore;
use crate::utils::{local_day, query_key, today};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Summary of one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub store_id: u64,
    /// Provider calls made by the seed, region-power and broad phases.
    pub seed_call_count: usize,
    /// Provider calls made for the verification keywords; always 10.
    pub exposure_call_count: usize,
    pub verification_keywords: Vec<String>,
    pub candidates_found: usize,
    pub candidates_saved: usize,
}

/// Best placement per blogger, per verification keyword.
pub type ExposureMap = HashMap<String, HashMap<String, ExposureHit>>;

/// Runs the discovery pipeline for one store against a search provider.
///
/// One analyzer may serve several runs; each [`BloggerAnalyzer::run_discovery`]
/// starts with a fresh query cache and candidate pool.
pub struct BloggerAnalyzer<'a, P> {
    /// Batch search over the provider, bounded by `fetch.concurrency`.
    fetcher: BatchFetcher<P>,
    /// Query templates and category tables.
    vocabulary: &'a Vocabulary,
    /// Fetch limits, discovery sizes and retention.
    settings: &'a Settings,
}

impl<'a, P> BloggerAnalyzer<'a, P>
where
    P: SearchProvider,
{
    /// Create an analyzer.
    ///
    /// # Arguments
    ///
    /// * `provider` - Search backend, usually a [`crate::search::retry::RetrySearch`]
    /// * `vocabulary` - Loaded vocabulary table
    /// * `settings` - Loaded settings
    ///
    /// # Returns
    ///
    /// An analyzer whose fetcher uses `settings.fetch.concurrency`.
    pub fn new(provider: P, vocabulary: &'a Vocabulary, settings: &'a Settings) -> Self {
        Self {
            fetcher: BatchFetcher::new(provider, settings.fetch.concurrency),
            vocabulary,
            settings,
        }
    }

    #[instrument(level = "info", skip_all, fields(region = %profile.region_text, category = %profile.category_text))]
    pub async fn run_discovery<S>(
        &self,
        profile: &StoreProfile,
        store: &mut S,
        progress: &dyn ProgressSink,
    ) -> Result<DiscoveryOutcome>
    where
        S: ExposureStore,
    {
        let fetch = &self.settings.fetch;
        let plan = QueryPlan::build(profile, self.vocabulary);
        let locality = profile.locality();
        let mut cache = QueryCache::new();
        let mut pool = CandidatePool::new();
        let mut discovery_calls = 0usize;

        info!(
            seed = plan.seed.len(),
            region_power = plan.region_power.len(),
            broad = plan.broad.len(),
            verification = plan.verification.len(),
            "query plan built"
        );

        let phases = [
            (Phase::Seed, Stage::Search, &plan.seed, fetch.seed_limit),
            (Phase::RegionPower, Stage::RegionPower, &plan.region_power, fetch.expand_limit),
            (Phase::Broad, Stage::BroadSearch, &plan.broad, fetch.expand_limit),
        ];
        for (phase, stage, queries, limit) in phases {
            emit(progress, stage, 1, 2, format!("{} queries", queries.len()));
            let batch = self.fetcher.fetch(&mut cache, queries, limit).await;
            discovery_calls += batch.stats.issued;
            let created = pool.absorb(phase, queries, &batch.results, &locality);
            if phase != Phase::Seed {
                pool.record_phase_hits(phase, queries);
            }
            emit(progress, stage, 2, 2, format!("{created} new candidates, {} total", pool.len()));
        }

        emit(progress, Stage::Scoring, 1, 2, format!("{} candidates", pool.len()));
        let today = today();
        let ranked = self.score(pool, &locality, profile, plan.seed.len(), today);
        let candidates_found = ranked.len();
        let selected: Vec<CandidateBlogger> = ranked.into_iter().take(self.settings.discovery.persist_top).collect();
        emit(progress, Stage::Scoring, 2, 2, format!("{} selected", selected.len()));

        emit(progress, Stage::Exposure, 1, 2, format!("{} keywords", plan.verification.len()));
        let batch = self
            .fetcher
            .fetch(&mut cache, &plan.verification, fetch.exposure_limit)
            .await;
        let exposure = exposure_mapping(&plan.verification, &batch.results);
        emit(progress, Stage::Exposure, 2, 2, "verification done".to_string());

        check_verification(plan.verification.len(), batch.stats.issued)?;

        emit(progress, Stage::Saving, 1, 2, format!("{} candidates", selected.len()));
        let store_id = store.upsert_store(profile).await?;
        self.persist(store, store_id, &selected, &plan.verification, &exposure)
            .await?;
        let pruned = store.prune(self.settings.discovery.retention_days).await?;
        store.commit().await?;
        emit(progress, Stage::Saving, 2, 2, format!("{pruned} expired facts pruned"));

        let outcome = DiscoveryOutcome {
            store_id,
            seed_call_count: discovery_calls,
            exposure_call_count: batch.stats.issued,
            verification_keywords: plan.verification,
            candidates_found,
            candidates_saved: selected.len(),
        };
        info!(
            store_id,
            seed_calls = outcome.seed_call_count,
            exposure_calls = outcome.exposure_call_count,
            found = outcome.candidates_found,
            saved = outcome.candidates_saved,
            "discovery finished"
        );
        emit(progress, Stage::Done, 1, 1, format!("{} candidates saved", selected.len()));
        Ok(outcome)
    }

    /// Derive rates and scores, best first; ties keep id order.
    fn score(
        &self,
        pool: CandidatePool,
        locality: &Locality,
        profile: &StoreProfile,
        seed_total: usize,
        today: NaiveDate,
    ) -> Vec<CandidateBlogger> {
        let vocab = self.vocabulary;
        let match_keywords = QueryPlan::match_keywords(profile, vocab);
        let mut ranked = pool.into_candidates();
        for c in &mut ranked {
            c.food_bias_rate = calc_food_bias(&c.posts, &vocab.food_words);
            c.sponsor_signal_rate = calc_sponsor_signal(&c.posts, &vocab.sponsor_words);
            c.base_score = base_score(c, locality, seed_total, today);
            c.keyword_match_ratio = keyword_match_ratio(&c.posts, &match_keywords);
            c.queries_hit_ratio = c.queries_hit.len() as f64 / seed_total.max(1) as f64;
        }
        ranked.sort_by(|a, b| b.base_score.total_cmp(&a.base_score));
        ranked
    }

    async fn persist<S: ExposureStore>(
        &self,
        store: &mut S,
        store_id: u64,
        candidates: &[CandidateBlogger],
        keywords: &[String],
        exposure: &ExposureMap,
    ) -> Result<()> {
        let now = Utc::now();
        let checked_on = local_day(now);
        for c in candidates {
            let profile = CandidateProfile::from_candidate(c, self.settings.discovery.sample_posts, now);
            store.upsert_candidate_profile(profile).await?;
        }
        let mut exposed = 0usize;
        for keyword in keywords {
            let hits = exposure.get(keyword);
            for c in candidates {
                let hit = hits.and_then(|m| m.get(&c.blogger_id));
                exposed += usize::from(hit.is_some());
                store
                    .record_exposure_fact(exposure_fact(store_id, keyword, &c.blogger_id, hit, checked_on, now))
                    .await?;
            }
        }
        info!(
            store_id,
            profiles = candidates.len(),
            facts = candidates.len() * keywords.len(),
            exposed,
            "evidence staged"
        );
        Ok(())
    }
}

fn emit(progress: &dyn ProgressSink, stage: Stage, current: usize, total: usize, message: String) {
    progress.emit(ProgressEvent {
        stage,
        current,
        total,
        message,
    });
}

/// Both the keyword count and the calls issued for it must be exactly ten.
fn check_verification(keywords: usize, issued: usize) -> Result<()> {
    if keywords != VERIFICATION_KEYWORDS {
        return Err(Error::Invariant(format!(
            "verification keyword count must be {VERIFICATION_KEYWORDS}, got {keywords}"
        )));
    }
    if issued != VERIFICATION_KEYWORDS {
        return Err(Error::Invariant(format!(
            "verification calls must be {VERIFICATION_KEYWORDS}, got {issued}"
        )));
    }
    Ok(())
}

/// Best (lowest) rank per blogger for each keyword, with that post.
pub fn exposure_mapping(keywords: &[String], results: &HashMap<String, Vec<SearchResultItem>>) -> ExposureMap {
    let mut mapping = ExposureMap::new();
    for keyword in keywords {
        let mut best: HashMap<String, ExposureHit> = HashMap::new();
        for (rank0, item) in results.get(&query_key(keyword)).into_iter().flatten().enumerate() {
            let Some(id) = blogger_id_from_item(item) else {
                continue;
            };
            // results arrive in rank order, so the first placement is the best
            best.entry(id).or_insert_with(|| ExposureHit {
                rank: rank0 as u32 + 1,
                post_link: item.link.clone(),
                post_title: item.title.clone(),
            });
        }
        mapping.insert(keyword.clone(), best);
    }
    mapping
}

fn exposure_fact(
    store_id: u64,
    keyword: &str,
    blogger_id: &str,
    hit: Option<&ExposureHit>,
    checked_on: NaiveDate,
    checked_at: chrono::DateTime<Utc>,
) -> ExposureFact {
    let rank = hit.map(|h| h.rank);
    ExposureFact {
        store_id,
        keyword: keyword.to_string(),
        blogger_id: blogger_id.to_string(),
        rank,
        strength_points: strength_points(rank),
        is_page1: rank.is_some_and(|r| r <= PAGE1_MAX_RANK),
        is_exposed: rank.is_some_and(|r| r <= EXPOSED_MAX_RANK),
        post_link: hit.map(|h| h.post_link.clone()),
        post_title: hit.map(|h| h.post_title.clone()),
        checked_on,
        checked_at,
    }
}
