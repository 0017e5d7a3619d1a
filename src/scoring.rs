//! Candidate and exposure scoring.
//!
//! Two scores with different jobs:
//!
//! - [`base_score`] (0..=75) ranks candidates during discovery from the
//!   evidence gathered in the current run.
//! - [`performance_score`] (0..=100) ranks bloggers for reporting from
//!   persisted exposure facts.
//!
//! [`strength_points`] converts one verification rank into the exposure unit
//! both the facts and the report aggregate.

use crate::models::{CandidateBlogger, Locality, SearchResultItem};
use chrono::NaiveDate;

pub const BASE_SCORE_MAX: f64 = 75.0;
/// Strength sum at which the strength part of the performance score saturates.
pub const STRENGTH_SATURATION: f64 = 35.0;
pub const PAGE1_MAX_RANK: u32 = 10;
pub const EXPOSED_MAX_RANK: u32 = 30;

const RECENCY_MAX: f64 = 15.0;
const RECENCY_HORIZON_DAYS: f64 = 60.0;
const RANK_QUALITY_MAX: f64 = 15.0;
const RANK_FLOOR: f64 = 30.0;
const LOCALITY_MAX: f64 = 15.0;
const COVERAGE_MAX: f64 = 10.0;
const ACTIVITY_MAX: f64 = 10.0;
const ACTIVITY_FULL_POSTS: f64 = 20.0;
const PLACE_FIT_MAX: f64 = 10.0;

/// Parse a provider post date.
///
/// Accepts `YYYYMMDD`, or `YYYY-MM-DD`, `YYYY.MM.DD`, `YYYY/MM/DD` in the
/// first ten characters. Anything else is absent.
pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    let head = s.get(..10)?;
    ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

/// Share of posts whose text contains any of `words`; 0 without posts.
fn share_mentioning<S: AsRef<str>>(posts: &[SearchResultItem], words: &[S]) -> f64 {
    if posts.is_empty() {
        return 0.0;
    }
    let hits = posts
        .iter()
        .filter(|p| {
            let text = p.text();
            words.iter().any(|w| text.contains(w.as_ref()))
        })
        .count();
    hits as f64 / posts.len() as f64
}

pub fn calc_food_bias<S: AsRef<str>>(posts: &[SearchResultItem], food_words: &[S]) -> f64 {
    share_mentioning(posts, food_words)
}

pub fn calc_sponsor_signal<S: AsRef<str>>(posts: &[SearchResultItem], sponsor_words: &[S]) -> f64 {
    share_mentioning(posts, sponsor_words)
}

/// Share of post titles containing any match keyword, ignoring case.
pub fn keyword_match_ratio<S: AsRef<str>>(posts: &[SearchResultItem], keywords: &[S]) -> f64 {
    if posts.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let keywords: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();
    let hits = posts
        .iter()
        .filter(|p| {
            let title = p.title.to_lowercase();
            keywords.iter().any(|k| title.contains(k.as_str()))
        })
        .count();
    hits as f64 / posts.len() as f64
}

pub fn food_bias_penalty(food_bias_rate: f64) -> f64 {
    if food_bias_rate >= 0.75 {
        -10.0
    } else if food_bias_rate >= 0.60 {
        -6.0
    } else if food_bias_rate >= 0.50 {
        -3.0
    } else {
        0.0
    }
}

fn recency(posts: &[SearchResultItem], today: NaiveDate) -> f64 {
    let Some(latest) = posts
        .iter()
        .filter_map(|p| p.post_date.as_deref().and_then(parse_post_date))
        .max()
    else {
        return 0.0;
    };
    let days = (today - latest).num_days().max(0) as f64;
    RECENCY_MAX * (1.0 - days.min(RECENCY_HORIZON_DAYS) / RECENCY_HORIZON_DAYS)
}

fn rank_quality(ranks: &[u32]) -> f64 {
    if ranks.is_empty() {
        return 0.0;
    }
    let avg = ranks.iter().map(|r| *r as f64).sum::<f64>() / ranks.len() as f64;
    let decay = (avg.clamp(1.0, RANK_FLOOR) - 1.0) / (RANK_FLOOR - 1.0);
    RANK_QUALITY_MAX * (1.0 - decay)
}

/// Composite discovery score, clamped to `[0, 75]`.
///
/// Reads the candidate's `food_bias_rate`, so compute that first.
/// `queries_total` is the number of seed queries issued.
pub fn base_score(candidate: &CandidateBlogger, locality: &Locality, queries_total: usize, today: NaiveDate) -> f64 {
    let posts = &candidate.posts;
    let post_count = posts.len().max(1) as f64;

    let locality_part = (candidate.local_hits as f64 / post_count * 30.0).min(LOCALITY_MAX);
    let coverage = if queries_total == 0 {
        0.0
    } else {
        (candidate.queries_hit.len() as f64 / queries_total as f64 * 10.0).min(COVERAGE_MAX)
    };
    let activity = (posts.len() as f64 / ACTIVITY_FULL_POSTS * 10.0).min(ACTIVITY_MAX);
    let place_hits = posts.iter().filter(|p| locality.mentions_address(&p.text())).count();
    let place_fit = (place_hits as f64 / post_count * 20.0).min(PLACE_FIT_MAX);

    let total = recency(posts, today)
        + rank_quality(&candidate.ranks)
        + locality_part
        + coverage
        + activity
        + place_fit
        + food_bias_penalty(candidate.food_bias_rate);
    total.clamp(0.0, BASE_SCORE_MAX)
}

/// Exposure strength of one verification rank.
pub fn strength_points(rank: Option<u32>) -> u8 {
    match rank {
        Some(1..=3) => 5,
        Some(4..=10) => 3,
        Some(11..=20) => 2,
        Some(21..=30) => 1,
        _ => 0,
    }
}

/// Reporting score in `[0, 100]`, rounded to one decimal.
pub fn performance_score(strength_sum: u32, exposed_keywords: usize, total_keywords: usize) -> f64 {
    let strength_part = (strength_sum as f64 / STRENGTH_SATURATION).min(1.0) * 70.0;
    let coverage_part = (exposed_keywords as f64 / total_keywords.max(1) as f64).min(1.0) * 30.0;
    ((strength_part + coverage_part) * 10.0).round() / 10.0
}
