//! Tiered report over persisted exposure facts.
//!
//! Facts inside the trailing window are aggregated per blogger, scored with
//! [`performance_score`], and split into:
//!
//! - **top tier**: the best `top_tier_size` bloggers by performance
//! - **operational pool**: up to `pool_size` of the rest, under a food quota
//! - **competition**: the store's own blog and competing store blogs, kept
//!   out of both tiers
//!
//! The pool is filled in two passes over the performance-sorted remainder.
//! The first takes non-food bloggers until the non-food minimum is met. The
//! second fills the remaining slots in order, skipping food-biased bloggers
//! once the food cap is reached.

use crate::blogger_id::blog_url_from_id;
use crate::config::{ReportSettings, Vocabulary};
use crate::error::Result;
use crate::models::{
    BlogKind, BloggerReport, CandidateProfile, ExposureDetail, ExposureFact, ExposurePotential, ReportMeta,
    StoreProfile, TieredReport,
};
use crate::scoring::performance_score;
use crate::store::{ExposureStore, StoreError};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument};

pub const TAG_FOOD_BIASED: &str = "food-biased";
pub const TAG_SPONSOR_LEANING: &str = "sponsor-leaning";
pub const TAG_STABLE_EXPOSURE: &str = "stable-exposure";
pub const TAG_UNEXPOSED: &str = "unexposed";

/// Self-blog signal total at which a blog counts as the store's own.
const SELF_BLOG_THRESHOLD: u32 = 4;

/// Read the window's facts for `store_id` and build its report.
#[instrument(level = "info", skip_all, fields(store_id = store_id, window_days = settings.window_days))]
pub async fn build_tiered_report<S>(
    store: &S,
    store_id: u64,
    settings: &ReportSettings,
    vocabulary: &Vocabulary,
) -> Result<TieredReport>
where
    S: ExposureStore,
{
    let record = store
        .store_profile(store_id)
        .await?
        .ok_or(StoreError::UnknownStore(store_id))?;
    let facts = store.read_exposure_facts(store_id, settings.window_days).await?;

    let mut profiles = HashMap::new();
    for blogger_id in facts.iter().map(|f| f.blogger_id.as_str()).unique() {
        if let Some(profile) = store.candidate_profile(blogger_id).await? {
            profiles.insert(blogger_id.to_string(), profile);
        }
    }

    let report = report_from_facts(store_id, &record.profile, &facts, &profiles, settings, vocabulary, Utc::now());
    info!(
        top_tier = report.top_tier.len(),
        pool = report.operational_pool.len(),
        competition = report.competition.len(),
        facts = report.meta.fact_count,
        "report built"
    );
    Ok(report)
}

/// Pure report construction from already-loaded facts and profiles.
pub fn report_from_facts(
    store_id: u64,
    store: &StoreProfile,
    facts: &[ExposureFact],
    profiles: &HashMap<String, CandidateProfile>,
    settings: &ReportSettings,
    vocabulary: &Vocabulary,
    now: DateTime<Utc>,
) -> TieredReport {
    let total_keywords = facts.iter().map(|f| f.keyword.as_str()).unique().count();

    let mut ranked = Vec::new();
    let mut competition = Vec::new();
    for (blogger_id, blogger_facts) in facts.iter().into_group_map_by(|f| f.blogger_id.clone()) {
        let entry = blogger_entry(
            &blogger_id,
            &blogger_facts,
            profiles.get(&blogger_id),
            total_keywords,
            store,
            settings,
            vocabulary,
        );
        match entry.blog_kind {
            BlogKind::Normal => ranked.push(entry),
            BlogKind::OwnStore | BlogKind::Competitor => competition.push(entry),
        }
    }
    let candidate_count = ranked.len() + competition.len();
    sort_by_performance(&mut competition);
    let (top_tier, operational_pool) = select_tiers(ranked, settings);

    TieredReport {
        top_tier,
        operational_pool,
        competition,
        meta: ReportMeta {
            store_id,
            window_days: settings.window_days,
            total_keywords,
            fact_count: facts.len(),
            candidate_count,
            generated_at: now,
        },
    }
}

/// Performance descending; strength, then id, break ties.
fn sort_by_performance(entries: &mut [BloggerReport]) {
    entries.sort_by(|a, b| {
        b.performance_score
            .total_cmp(&a.performance_score)
            .then_with(|| b.strength_sum.cmp(&a.strength_sum))
            .then_with(|| a.blogger_id.cmp(&b.blogger_id))
    });
}

fn is_food_biased(entry: &BloggerReport, settings: &ReportSettings) -> bool {
    entry.food_bias_rate >= settings.food_bias_threshold
}

/// Split ranked entries into the top tier and the quota-bound pool.
pub fn select_tiers(
    mut entries: Vec<BloggerReport>,
    settings: &ReportSettings,
) -> (Vec<BloggerReport>, Vec<BloggerReport>) {
    sort_by_performance(&mut entries);
    let split = settings.top_tier_size.min(entries.len());
    let remaining = entries.split_off(split);
    let top_tier = entries;

    let target = settings.pool_size;
    let nonfood_min = settings.nonfood_min();
    let food_cap = settings.food_cap();

    let mut chosen: Vec<usize> = Vec::new();
    let mut taken: HashSet<usize> = HashSet::new();
    let mut food_count = 0usize;

    // pass 1: non-food minimum
    for (i, entry) in remaining.iter().enumerate() {
        if chosen.len() >= nonfood_min.min(target) {
            break;
        }
        if !is_food_biased(entry, settings) {
            chosen.push(i);
            taken.insert(i);
        }
    }

    // pass 2: fill in order under the food cap
    for (i, entry) in remaining.iter().enumerate() {
        if chosen.len() >= target {
            break;
        }
        if taken.contains(&i) {
            continue;
        }
        if is_food_biased(entry, settings) {
            if food_count >= food_cap {
                continue;
            }
            food_count += 1;
        }
        chosen.push(i);
    }

    let mut slots: Vec<Option<BloggerReport>> = remaining.into_iter().map(Some).collect();
    let pool = chosen.into_iter().filter_map(|i| slots[i].take()).collect();
    (top_tier, pool)
}

fn blogger_entry(
    blogger_id: &str,
    facts: &[&ExposureFact],
    profile: Option<&CandidateProfile>,
    total_keywords: usize,
    store: &StoreProfile,
    settings: &ReportSettings,
    vocabulary: &Vocabulary,
) -> BloggerReport {
    let strength_sum: u32 = facts.iter().map(|f| u32::from(f.strength_points)).sum();
    let page1: BTreeSet<&str> = facts.iter().filter(|f| f.is_page1).map(|f| f.keyword.as_str()).collect();
    let exposed: BTreeSet<&str> = facts.iter().filter(|f| f.is_exposed).map(|f| f.keyword.as_str()).collect();
    let exposed_posts = distinct_posts(facts.iter().copied().filter(|f| f.is_exposed));
    let page1_posts = distinct_posts(facts.iter().copied().filter(|f| f.is_page1));

    // lowest rank; the most recent check wins a tie
    let best = facts
        .iter()
        .filter_map(|f| f.rank.map(|r| (r, *f)))
        .min_by(|(ra, fa), (rb, fb)| ra.cmp(rb).then_with(|| fb.checked_at.cmp(&fa.checked_at)));
    let best_rank = best.map(|(r, _)| r);
    let best_rank_keyword = best.map(|(_, f)| f.keyword.clone());

    let food_bias_rate = profile.map_or(0.0, |p| p.food_bias_rate);
    let sponsor_signal_rate = profile.map_or(0.0, |p| p.sponsor_signal_rate);
    let blogger_name = profile.and_then(|p| p.blogger_name.clone());

    // fall back to keyword counts when no post links were recorded
    let effective_exposed = if exposed_posts > 0 { exposed_posts } else { exposed.len() };
    let effective_page1 = if page1_posts > 0 { page1_posts } else { page1.len() };

    let mut tags = Vec::new();
    if food_bias_rate >= settings.food_bias_threshold {
        tags.push(TAG_FOOD_BIASED.to_string());
    }
    if sponsor_signal_rate >= settings.sponsor_threshold {
        tags.push(TAG_SPONSOR_LEANING.to_string());
    }
    if exposed.len() >= settings.stable_exposure_keywords {
        tags.push(TAG_STABLE_EXPOSURE.to_string());
    }
    if exposed.is_empty() {
        tags.push(TAG_UNEXPOSED.to_string());
    }

    let report_line1 = format!(
        "Exposed on {} of {} keywords (page 1: {})",
        exposed.len(),
        total_keywords,
        page1.len()
    );
    let report_line2 = match (&best_rank, &best_rank_keyword) {
        (Some(rank), Some(keyword)) => format!("Best rank: {rank} (keyword: {keyword})"),
        _ => "Best rank: -".to_string(),
    };

    BloggerReport {
        blogger_id: blogger_id.to_string(),
        blog_url: profile.map_or_else(|| blog_url_from_id(blogger_id), |p| p.blog_url.clone()),
        blog_kind: detect_blog_kind(blogger_id, blogger_name.as_deref(), store, vocabulary),
        blogger_name,
        performance_score: performance_score(strength_sum, exposed.len(), total_keywords),
        strength_sum,
        page1_keywords: page1.len(),
        exposed_keywords: exposed.len(),
        unique_exposed_posts: exposed_posts,
        best_rank,
        best_rank_keyword,
        base_score: profile.map_or(0.0, |p| p.base_score),
        food_bias_rate,
        sponsor_signal_rate,
        tags,
        report_line1,
        report_line2,
        exposure_potential: exposure_potential(effective_exposed, effective_page1, best_rank),
        exposure_details: exposure_details(facts),
    }
}

fn distinct_posts<'a>(facts: impl Iterator<Item = &'a ExposureFact>) -> usize {
    facts
        .filter_map(|f| f.post_link.as_deref())
        .filter(|l| !l.is_empty())
        .unique()
        .count()
}

pub fn exposure_potential(unique_exposed: usize, unique_page1: usize, best_rank: Option<u32>) -> ExposurePotential {
    if unique_exposed >= 5 {
        ExposurePotential::VeryHigh
    } else if unique_exposed >= 3 && unique_page1 >= 1 {
        ExposurePotential::High
    } else if unique_exposed >= 1 && best_rank.is_some_and(|r| r <= 20) {
        ExposurePotential::Medium
    } else {
        ExposurePotential::Low
    }
}

/// One line per exposed (keyword, post), best rank first.
fn exposure_details(facts: &[&ExposureFact]) -> Vec<ExposureDetail> {
    let mut details: Vec<ExposureDetail> = Vec::new();
    for f in facts.iter().filter(|f| f.is_exposed) {
        let Some(rank) = f.rank else { continue };
        match details
            .iter_mut()
            .find(|d| d.keyword == f.keyword && d.post_link == f.post_link)
        {
            Some(d) => {
                d.rank = d.rank.min(rank);
                d.strength_points = d.strength_points.max(f.strength_points);
                d.is_page1 |= f.is_page1;
            }
            None => details.push(ExposureDetail {
                keyword: f.keyword.clone(),
                rank,
                strength_points: f.strength_points,
                is_page1: f.is_page1,
                post_link: f.post_link.clone(),
                post_title: f.post_title.clone(),
            }),
        }
    }
    details.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.keyword.cmp(&b.keyword)));
    details
}

/// Classify a blog as the store's own, a competitor's, or a normal reviewer.
///
/// Own-store signals: the name contains the store name (+3), the id contains
/// a store-name token (+2), the name contains the category (+2). A total of 4
/// or more is the store's own blog. Otherwise a franchise brand in the name or
/// id, or a name with the category followed by a store suffix ("...안경 역삼점"),
/// marks a competitor.
pub fn detect_blog_kind(
    blogger_id: &str,
    blogger_name: Option<&str>,
    store: &StoreProfile,
    vocabulary: &Vocabulary,
) -> BlogKind {
    let name = blogger_name.unwrap_or_default().to_lowercase();
    let name_compact: String = name.split_whitespace().collect();
    let id = blogger_id.to_lowercase();
    let category = store.category_text.to_lowercase();
    let store_name = store.store_name.as_deref().unwrap_or_default().to_lowercase();
    let store_compact: String = store_name.split_whitespace().collect();

    let mut score = 0;
    if !store_compact.is_empty() && name_compact.contains(&store_compact) {
        score += 3;
    }
    if store_name
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .any(|t| id.contains(t))
    {
        score += 2;
    }
    if !category.is_empty() && name.contains(&category) {
        score += 2;
    }
    if score >= SELF_BLOG_THRESHOLD {
        return BlogKind::OwnStore;
    }

    for brand in &vocabulary.franchise_names {
        let brand = brand.to_lowercase();
        let brand_compact: String = brand.split_whitespace().collect();
        if (!name.is_empty() && name.contains(&brand)) || (!brand_compact.is_empty() && id.contains(&brand_compact)) {
            return BlogKind::Competitor;
        }
    }

    if !category.is_empty() {
        if let Some(cat_pos) = name_compact.find(&category) {
            let after = &name_compact[cat_pos + category.len()..];
            if vocabulary.store_suffixes.iter().any(|s| after.contains(s.as_str())) {
                return BlogKind::Competitor;
            }
        }
    }
    BlogKind::Normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::fact;
    use crate::store::memory::MemoryStore;
    use crate::utils::today;

    fn settings() -> ReportSettings {
        ReportSettings::default()
    }

    fn vocab() -> Vocabulary {
        Vocabulary::builtin().unwrap()
    }

    fn entry(id: &str, score: f64, food_bias_rate: f64) -> BloggerReport {
        BloggerReport {
            blogger_id: id.to_string(),
            blog_url: blog_url_from_id(id),
            blogger_name: None,
            performance_score: score,
            strength_sum: 0,
            page1_keywords: 0,
            exposed_keywords: 0,
            unique_exposed_posts: 0,
            best_rank: None,
            best_rank_keyword: None,
            base_score: 0.0,
            food_bias_rate,
            sponsor_signal_rate: 0.0,
            tags: Vec::new(),
            report_line1: String::new(),
            report_line2: String::new(),
            exposure_potential: ExposurePotential::Low,
            blog_kind: BlogKind::Normal,
            exposure_details: Vec::new(),
        }
    }

    #[test]
    fn test_top_tier_is_first_twenty() {
        let entries: Vec<BloggerReport> = (0..25).rev().map(|i| entry(&format!("b{i:02}"), i as f64, 0.0)).collect();
        let (top, pool) = select_tiers(entries, &settings());
        let top_ids: Vec<String> = top.iter().map(|e| e.blogger_id.clone()).collect();
        let expected: Vec<String> = (5..25).rev().map(|i| format!("b{i:02}")).collect();
        assert_eq!(top_ids, expected);
        assert_eq!(pool.len(), 5);
        assert!(pool.iter().all(|p| !top_ids.contains(&p.blogger_id)));
    }

    #[test]
    fn test_pool_food_cap_and_nonfood_minimum() {
        let mut entries = Vec::new();
        // 20 top-tier bloggers, then 30 food-biased ahead of 15 non-food
        for i in 0..20 {
            entries.push(entry(&format!("t{i:02}"), 100.0 - i as f64, 0.0));
        }
        for i in 0..30 {
            entries.push(entry(&format!("f{i:02}"), 70.0 - i as f64 * 0.1, 0.9));
        }
        for i in 0..15 {
            entries.push(entry(&format!("n{i:02}"), 10.0 - i as f64 * 0.1, 0.1));
        }
        let (top, pool) = select_tiers(entries, &settings());
        assert_eq!(top.len(), 20);
        let food = pool.iter().filter(|e| e.food_bias_rate >= 0.6).count();
        let nonfood = pool.len() - food;
        assert_eq!(food, 24);
        assert_eq!(nonfood, 15);
        assert!(pool.len() <= 40);
        // non-food minimum is taken first, in score order
        assert_eq!(pool[0].blogger_id, "n00");
        assert_eq!(pool[12].blogger_id, "f00");
    }

    #[test]
    fn test_pool_fills_to_size_with_nonfood() {
        let mut entries = Vec::new();
        for i in 0..80 {
            entries.push(entry(&format!("n{i:02}"), 100.0 - i as f64, 0.0));
        }
        let (_, pool) = select_tiers(entries, &settings());
        assert_eq!(pool.len(), 40);
        assert_eq!(pool[0].blogger_id, "n20");
        assert_eq!(pool[39].blogger_id, "n59");
    }

    fn store_profile() -> StoreProfile {
        StoreProfile::new("강남", "안경원", None, None, Some("밝은안경"), None).unwrap()
    }

    fn with_post(mut f: ExposureFact, post: &str) -> ExposureFact {
        f.post_link = Some(format!("https://blog.naver.com/{}/{post}", f.blogger_id));
        f
    }

    #[test]
    fn test_aggregation_and_annotations() {
        let day = today();
        let facts = vec![
            with_post(fact(1, "k1", "a", Some(2), day), "1"),
            with_post(fact(1, "k2", "a", Some(8), day), "2"),
            with_post(fact(1, "k3", "a", Some(15), day), "3"),
            with_post(fact(1, "k4", "a", Some(25), day), "4"),
            fact(1, "k5", "a", None, day),
            fact(1, "k1", "b", None, day),
            fact(1, "k2", "b", None, day),
        ];
        let mut profiles = HashMap::new();
        let mut profile_a = crate::models::CandidateProfile {
            blogger_id: "a".into(),
            blog_url: blog_url_from_id("a"),
            blogger_name: Some("안경 리뷰어".into()),
            last_post_date: None,
            base_score: 40.0,
            food_bias_rate: 0.7,
            sponsor_signal_rate: 0.5,
            region_power_hits: 0,
            broad_query_hits: 0,
            keyword_match_ratio: 0.0,
            queries_hit_ratio: 0.0,
            posts_sample: Vec::new(),
            updated_at: Utc::now(),
        };
        profiles.insert("a".to_string(), profile_a.clone());
        profile_a.blogger_id = "b".into();
        profile_a.food_bias_rate = 0.0;
        profile_a.sponsor_signal_rate = 0.0;
        profiles.insert("b".to_string(), profile_a);

        let report = report_from_facts(1, &store_profile(), &facts, &profiles, &settings(), &vocab(), Utc::now());
        assert_eq!(report.meta.total_keywords, 5);
        assert_eq!(report.meta.fact_count, 7);
        assert_eq!(report.meta.candidate_count, 2);
        assert_eq!(report.top_tier.len(), 2);

        let a = &report.top_tier[0];
        assert_eq!(a.blogger_id, "a");
        assert_eq!(a.strength_sum, 5 + 3 + 2 + 1);
        assert_eq!(a.page1_keywords, 2);
        assert_eq!(a.exposed_keywords, 4);
        assert_eq!(a.unique_exposed_posts, 4);
        assert_eq!(a.best_rank, Some(2));
        assert_eq!(a.best_rank_keyword.as_deref(), Some("k1"));
        // 11/35*70 = 22.0, 4/5*30 = 24.0
        assert_eq!(a.performance_score, 46.0);
        assert_eq!(
            a.tags,
            vec![TAG_FOOD_BIASED, TAG_SPONSOR_LEANING, TAG_STABLE_EXPOSURE]
        );
        assert_eq!(a.exposure_potential, ExposurePotential::High);
        assert_eq!(a.exposure_details.len(), 4);
        assert_eq!(a.exposure_details[0].keyword, "k1");
        assert_eq!(a.report_line2, "Best rank: 2 (keyword: k1)");

        let b = &report.top_tier[1];
        assert_eq!(b.performance_score, 0.0);
        assert_eq!(b.tags, vec![TAG_UNEXPOSED]);
        assert_eq!(b.exposure_potential, ExposurePotential::Low);
        assert_eq!(b.report_line2, "Best rank: -");
    }

    #[test]
    fn test_exposure_potential_levels() {
        assert_eq!(exposure_potential(5, 0, Some(30)), ExposurePotential::VeryHigh);
        assert_eq!(exposure_potential(3, 1, Some(9)), ExposurePotential::High);
        assert_eq!(exposure_potential(3, 0, Some(12)), ExposurePotential::Medium);
        assert_eq!(exposure_potential(1, 0, Some(25)), ExposurePotential::Low);
        assert_eq!(exposure_potential(0, 0, None), ExposurePotential::Low);
    }

    #[test]
    fn test_detect_blog_kind() {
        let store = store_profile();
        let v = vocab();
        assert_eq!(
            detect_blog_kind("brightglass", Some("밝은안경 안경원 공식"), &store, &v),
            BlogKind::OwnStore
        );
        assert_eq!(
            detect_blog_kind("someone", Some("안경원 역삼점"), &store, &v),
            BlogKind::Competitor
        );
        assert_eq!(
            detect_blog_kind("someone", Some("안경원에 미친 남자"), &store, &v),
            BlogKind::Normal
        );
        assert_eq!(detect_blog_kind("someone", None, &store, &v), BlogKind::Normal);
    }

    #[test]
    fn test_franchise_is_competitor() {
        let v = vocab();
        let brand = v.franchise_names[0].clone();
        let store = store_profile();
        assert_eq!(
            detect_blog_kind("someone", Some(&format!("{brand} 강남점")), &store, &v),
            BlogKind::Competitor
        );
    }

    #[test]
    fn test_competition_kept_out_of_tiers() {
        let day = today();
        let facts = vec![
            fact(1, "k1", "own", Some(1), day),
            fact(1, "k1", "reviewer", Some(2), day),
        ];
        let mut profiles = HashMap::new();
        for (id, name) in [("own", "밝은안경 안경원"), ("reviewer", "일상 기록")] {
            profiles.insert(
                id.to_string(),
                crate::models::CandidateProfile {
                    blogger_id: id.into(),
                    blog_url: blog_url_from_id(id),
                    blogger_name: Some(name.into()),
                    last_post_date: None,
                    base_score: 0.0,
                    food_bias_rate: 0.0,
                    sponsor_signal_rate: 0.0,
                    region_power_hits: 0,
                    broad_query_hits: 0,
                    keyword_match_ratio: 0.0,
                    queries_hit_ratio: 0.0,
                    posts_sample: Vec::new(),
                    updated_at: Utc::now(),
                },
            );
        }
        let report = report_from_facts(1, &store_profile(), &facts, &profiles, &settings(), &vocab(), Utc::now());
        assert_eq!(report.top_tier.len(), 1);
        assert_eq!(report.top_tier[0].blogger_id, "reviewer");
        assert_eq!(report.competition.len(), 1);
        assert_eq!(report.competition[0].blog_kind, BlogKind::OwnStore);
        assert_eq!(report.meta.candidate_count, 2);
    }

    #[tokio::test]
    async fn test_build_from_store() {
        let mut store = MemoryStore::new();
        let id = store.upsert_store(&store_profile()).await.unwrap();
        store.record_exposure_fact(fact(id, "k1", "a", Some(3), today())).await.unwrap();
        let report = build_tiered_report(&store, id, &settings(), &vocab()).await.unwrap();
        assert_eq!(report.top_tier.len(), 1);
        assert_eq!(report.top_tier[0].blog_url, "https://blog.naver.com/a");
        assert_eq!(report.meta.store_id, id);

        let missing = build_tiered_report(&store, id + 1, &settings(), &vocab()).await;
        assert!(missing.is_err());
    }
}
