//! Data models shared by discovery, scoring, persistence and reporting.
//!
//! - [`StoreProfile`]: the immutable store descriptor an analysis starts from
//! - [`SearchResultItem`]: one provider hit
//! - [`CandidateBlogger`]: the evidence accumulator built during discovery
//! - [`CandidateProfile`]: the evidence summary persisted per blogger
//! - [`ExposureFact`]: one day's verification outcome for (store, keyword, blogger)
//! - [`TieredReport`]: the Top tier / operational pool output

use crate::error::{Error, Result};
use crate::utils::normalize_whitespace;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Address tokens kept per profile.
const MAX_ADDRESS_TOKENS: usize = 2;
/// Tokens longer than this (in characters) are dropped as noise.
const MAX_ADDRESS_TOKEN_CHARS: usize = 20;

/// Store descriptor for one analysis request.
///
/// Constructed once through [`StoreProfile::new`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreProfile {
    pub region_text: String,
    pub category_text: String,
    pub topic: Option<String>,
    pub place_url: Option<String>,
    pub store_name: Option<String>,
    pub address_text: Option<String>,
}

impl StoreProfile {
    /// Build a profile, trimming every field and dropping blank optionals.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when the region is blank.
    pub fn new(
        region_text: &str,
        category_text: &str,
        topic: Option<&str>,
        place_url: Option<&str>,
        store_name: Option<&str>,
        address_text: Option<&str>,
    ) -> Result<Self> {
        let region_text = normalize_whitespace(region_text);
        if region_text.is_empty() {
            return Err(Error::InvalidInput("region text must not be empty".into()));
        }
        let opt = |v: Option<&str>| v.map(normalize_whitespace).filter(|s| !s.is_empty());
        Ok(Self {
            region_text,
            category_text: normalize_whitespace(category_text),
            topic: opt(topic),
            place_url: opt(place_url),
            store_name: opt(store_name),
            address_text: opt(address_text),
        })
    }

    /// Up to two address tokens, skipping purely numeric and overlong ones.
    ///
    /// `"서울 강남구 역삼동 123-45"` yields `["서울", "강남구"]`.
    pub fn address_tokens(&self) -> Vec<String> {
        let Some(address) = &self.address_text else {
            return Vec::new();
        };
        address
            .replace(',', " ")
            .split_whitespace()
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .filter(|t| t.chars().count() <= MAX_ADDRESS_TOKEN_CHARS)
            .take(MAX_ADDRESS_TOKENS)
            .map(str::to_string)
            .collect()
    }

    /// Region text plus address tokens: the strings a post must mention to
    /// count as local.
    pub fn locality(&self) -> Locality {
        Locality {
            region: self.region_text.clone(),
            address_tokens: self.address_tokens(),
        }
    }
}

/// Locality terms derived from a [`StoreProfile`].
#[derive(Debug, Clone, Default)]
pub struct Locality {
    pub region: String,
    pub address_tokens: Vec<String>,
}

impl Locality {
    pub fn matches(&self, text: &str) -> bool {
        (!self.region.is_empty() && text.contains(&self.region)) || self.mentions_address(text)
    }

    pub fn mentions_address(&self, text: &str) -> bool {
        self.address_tokens.iter().any(|t| text.contains(t.as_str()))
    }
}

/// One search hit as returned by the provider, in provider order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct SearchResultItem {
    pub title: String,
    pub description: String,
    pub link: String,
    /// `YYYYMMDD` or an ISO-like date; unparseable values count as absent.
    pub post_date: Option<String>,
    pub author_link: Option<String>,
    pub author_name: Option<String>,
}

impl SearchResultItem {
    /// Title and description joined, the text all keyword checks run against.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Evidence accumulated for one blogger across the discovery phases.
///
/// Created once per id and only merged into afterwards.
#[derive(Debug, Clone, Default)]
pub struct CandidateBlogger {
    pub blogger_id: String,
    pub blog_url: String,
    pub blogger_name: Option<String>,
    /// 1-based ranks, one entry per appearance, in discovery order.
    pub ranks: Vec<u32>,
    pub queries_hit: BTreeSet<String>,
    /// Unique by link.
    pub posts: Vec<SearchResultItem>,
    pub local_hits: u32,

    // Derived once evidence collection ends.
    pub base_score: f64,
    pub food_bias_rate: f64,
    pub sponsor_signal_rate: f64,
    pub region_power_hits: usize,
    pub broad_query_hits: usize,
    pub keyword_match_ratio: f64,
    pub queries_hit_ratio: f64,
}

impl CandidateBlogger {
    pub fn new(blogger_id: &str, blog_url: String) -> Self {
        Self {
            blogger_id: blogger_id.to_string(),
            blog_url,
            ..Default::default()
        }
    }

    pub fn has_post(&self, link: &str) -> bool {
        self.posts.iter().any(|p| p.link == link)
    }
}

/// A sampled post kept in the persisted evidence summary.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PostSample {
    pub title: String,
    pub link: String,
    pub post_date: Option<String>,
}

/// Evidence summary persisted per blogger; the reporting side reads it back
/// for bias rates and display fields.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CandidateProfile {
    pub blogger_id: String,
    pub blog_url: String,
    pub blogger_name: Option<String>,
    pub last_post_date: Option<String>,
    pub base_score: f64,
    pub food_bias_rate: f64,
    pub sponsor_signal_rate: f64,
    pub region_power_hits: usize,
    pub broad_query_hits: usize,
    pub keyword_match_ratio: f64,
    pub queries_hit_ratio: f64,
    pub posts_sample: Vec<PostSample>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateProfile {
    pub fn from_candidate(candidate: &CandidateBlogger, sample_posts: usize, now: DateTime<Utc>) -> Self {
        Self {
            blogger_id: candidate.blogger_id.clone(),
            blog_url: candidate.blog_url.clone(),
            blogger_name: candidate.blogger_name.clone(),
            last_post_date: candidate.posts.first().and_then(|p| p.post_date.clone()),
            base_score: candidate.base_score,
            food_bias_rate: candidate.food_bias_rate,
            sponsor_signal_rate: candidate.sponsor_signal_rate,
            region_power_hits: candidate.region_power_hits,
            broad_query_hits: candidate.broad_query_hits,
            keyword_match_ratio: candidate.keyword_match_ratio,
            queries_hit_ratio: candidate.queries_hit_ratio,
            posts_sample: candidate
                .posts
                .iter()
                .take(sample_posts)
                .map(|p| PostSample {
                    title: p.title.clone(),
                    link: p.link.clone(),
                    post_date: p.post_date.clone(),
                })
                .collect(),
            updated_at: now,
        }
    }
}

/// Best placement of a blogger for one verification keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureHit {
    pub rank: u32,
    pub post_link: String,
    pub post_title: String,
}

/// One (store, keyword, blogger, day) verification outcome.
///
/// Unique per calendar day; re-checking the same day overwrites.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExposureFact {
    pub store_id: u64,
    pub keyword: String,
    pub blogger_id: String,
    pub rank: Option<u32>,
    pub strength_points: u8,
    pub is_page1: bool,
    pub is_exposed: bool,
    pub post_link: Option<String>,
    pub post_title: Option<String>,
    pub checked_on: NaiveDate,
    pub checked_at: DateTime<Utc>,
}

impl ExposureFact {
    /// The upsert slot this fact occupies.
    pub fn slot_key(&self) -> FactKey {
        FactKey {
            store_id: self.store_id,
            checked_on: self.checked_on,
            keyword: self.keyword.clone(),
            blogger_id: self.blogger_id.clone(),
        }
    }
}

/// Upsert key of an exposure fact.
///
/// Field order puts a store's facts next to each other, oldest day first, so
/// a window read is one range scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey {
    pub store_id: u64,
    pub checked_on: NaiveDate,
    pub keyword: String,
    pub blogger_id: String,
}

/// Persisted store row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreRecord {
    pub store_id: u64,
    pub profile: StoreProfile,
    pub created_at: DateTime<Utc>,
}

/// One keyword a blogger was exposed for, as shown in the report.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExposureDetail {
    pub keyword: String,
    pub rank: u32,
    pub strength_points: u8,
    pub is_page1: bool,
    pub post_link: Option<String>,
    pub post_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposurePotential {
    VeryHigh,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlogKind {
    Normal,
    /// The store's own blog.
    OwnStore,
    /// A franchise or competing store's blog.
    Competitor,
}

/// One blogger's line in the tiered report.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BloggerReport {
    pub blogger_id: String,
    pub blog_url: String,
    pub blogger_name: Option<String>,
    pub performance_score: f64,
    pub strength_sum: u32,
    pub page1_keywords: usize,
    pub exposed_keywords: usize,
    pub unique_exposed_posts: usize,
    pub best_rank: Option<u32>,
    pub best_rank_keyword: Option<String>,
    pub base_score: f64,
    pub food_bias_rate: f64,
    pub sponsor_signal_rate: f64,
    pub tags: Vec<String>,
    pub report_line1: String,
    pub report_line2: String,
    pub exposure_potential: ExposurePotential,
    pub blog_kind: BlogKind,
    pub exposure_details: Vec<ExposureDetail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReportMeta {
    pub store_id: u64,
    pub window_days: i64,
    /// Distinct keywords checked for this store inside the window.
    pub total_keywords: usize,
    pub fact_count: usize,
    pub candidate_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Output of the tiered selector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TieredReport {
    pub top_tier: Vec<BloggerReport>,
    pub operational_pool: Vec<BloggerReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competition: Vec<BloggerReport>,
    pub meta: ReportMeta,
}
