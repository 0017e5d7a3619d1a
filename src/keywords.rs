//! Query construction for every discovery phase.
//!
//! [`QueryPlan::build`] renders the vocabulary templates against a
//! [`StoreProfile`] and returns the four query sets of one analysis:
//!
//! | Phase | Size | Purpose |
//! |-------|------|---------|
//! | seed | ≤ 10 | category + region and store-specific combinations |
//! | region-power | ≤ 3 | popular neighbouring categories in the region |
//! | broad | ≤ 5 | category-adjacent, region-anchored queries |
//! | verification | = 10 | tracked intents + held-out category keywords |
//!
//! Each set is whitespace-normalized and deduplicated ignoring case in
//! first-seen order, and later phases drop any query an earlier phase already
//! used, so no query is shared between phases. Construction is deterministic.

use crate::config::{TemplateTable, Vocabulary};
use crate::models::StoreProfile;
use crate::utils::{dedupe_keep_order, normalize_whitespace, query_key};
use std::collections::HashSet;

pub const SEED_MAX: usize = 10;
pub const REGION_POWER_MAX: usize = 3;
pub const BROAD_MAX: usize = 5;
/// Exact size of the verification set.
pub const VERIFICATION_KEYWORDS: usize = 10;

/// Values substituted into query templates.
#[derive(Debug, Clone)]
struct Slots {
    region: String,
    category: String,
    tokens: Vec<String>,
    store_name: Option<String>,
}

impl Slots {
    fn from_profile(profile: &StoreProfile) -> Self {
        Self {
            region: profile.region_text.clone(),
            category: profile.category_text.clone(),
            tokens: profile.address_tokens(),
            store_name: profile.store_name.clone(),
        }
    }

    /// Render `template`, or `None` when it references a missing slot.
    fn render(&self, template: &str) -> Option<String> {
        let optional = [
            ("{t0}", self.tokens.first().map(String::as_str)),
            ("{t1}", self.tokens.get(1).map(String::as_str)),
            ("{s}", self.store_name.as_deref()),
        ];
        let mut out = template
            .replace("{r}", &self.region)
            .replace("{c}", &self.category);
        for (slot, value) in optional {
            if out.contains(slot) {
                out = out.replace(slot, value?);
            }
        }
        let out = normalize_whitespace(&out);
        (!out.is_empty()).then_some(out)
    }

    fn render_all<'a, I>(&'a self, templates: I) -> impl Iterator<Item = String>
    where
        I: Iterator<Item = &'a String>,
    {
        templates.filter_map(|t| self.render(t))
    }
}

/// The query sets of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub seed: Vec<String>,
    pub region_power: Vec<String>,
    pub broad: Vec<String>,
    pub verification: Vec<String>,
}

impl QueryPlan {
    pub fn build(profile: &StoreProfile, vocabulary: &Vocabulary) -> Self {
        let slots = Slots::from_profile(profile);
        let mut used: HashSet<String> = HashSet::new();

        let seed = take_fresh(seed_candidates(profile, vocabulary, &slots), &mut used, SEED_MAX);
        let region_power = take_fresh(
            region_power_candidates(profile, vocabulary, &slots),
            &mut used,
            REGION_POWER_MAX,
        );
        let broad = take_fresh(
            table_candidates(profile, vocabulary, &vocabulary.broad, &slots),
            &mut used,
            BROAD_MAX,
        );
        let verification = take_fresh(
            verification_candidates(profile, vocabulary, &slots),
            &mut used,
            VERIFICATION_KEYWORDS,
        );

        Self {
            seed,
            region_power,
            broad,
            verification,
        }
    }

    /// Match keywords for title checks: the category and its Hangul words of
    /// two or more syllables, or the topic's template words in topic mode.
    pub fn match_keywords(profile: &StoreProfile, vocabulary: &Vocabulary) -> Vec<String> {
        let category = profile.category_text.trim();
        if !category.is_empty() {
            let mut keywords = vec![category.to_string()];
            for token in hangul_words(category) {
                if token != category && !keywords.contains(&token) {
                    keywords.push(token);
                }
            }
            return keywords;
        }
        if let Some(templates) = profile.topic.as_deref().and_then(|t| vocabulary.topic_templates(t)) {
            return dedupe_keep_order(templates.iter().map(|t| t.replace("{r}", "")));
        }
        Vec::new()
    }
}

/// Normalize, dedupe, skip anything whose [`query_key`] is in `used`, take
/// `limit`, and mark the taken keys as used.
fn take_fresh<I>(candidates: I, used: &mut HashSet<String>, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let fresh: Vec<String> = dedupe_keep_order(candidates)
        .into_iter()
        .filter(|q| !used.contains(&query_key(q)))
        .take(limit)
        .collect();
    used.extend(fresh.iter().map(|q| query_key(q)));
    fresh
}

fn topic_mode(profile: &StoreProfile, vocabulary: &Vocabulary) -> Option<Vec<String>> {
    if !profile.category_text.is_empty() {
        return None;
    }
    profile
        .topic
        .as_deref()
        .and_then(|t| vocabulary.topic_templates(t))
        .map(<[String]>::to_vec)
}

fn seed_candidates(profile: &StoreProfile, vocabulary: &Vocabulary, slots: &Slots) -> Vec<String> {
    let seed = &vocabulary.seed;
    let head: Vec<String> = match topic_mode(profile, vocabulary) {
        Some(templates) => slots.render_all(templates.iter()).collect(),
        None => slots.render_all(seed.primary.iter()).collect(),
    };
    head.into_iter()
        .chain(slots.render_all(seed.store_specific.iter()))
        .chain(slots.render_all(seed.secondary.iter()))
        .collect()
}

/// Region-power templates never mention the store's own category.
fn region_power_candidates(profile: &StoreProfile, vocabulary: &Vocabulary, slots: &Slots) -> Vec<String> {
    let table = &vocabulary.region_power;
    let key = vocabulary.resolve_category(&profile.category_text, table);
    let own_words: Vec<String> = std::iter::once(profile.category_text.clone())
        .chain(key.map(str::to_string))
        .chain(hangul_words(&profile.category_text))
        .filter(|w| !w.is_empty())
        .collect();

    slots
        .render_all(table.for_key(key).iter().chain(table.fill.iter()))
        .filter(|q| {
            let rest = q.strip_prefix(slots.region.as_str()).unwrap_or(q.as_str());
            !own_words.iter().any(|w| rest.contains(w.as_str()))
        })
        .collect()
}

fn table_candidates(
    profile: &StoreProfile,
    vocabulary: &Vocabulary,
    table: &TemplateTable,
    slots: &Slots,
) -> Vec<String> {
    let key = vocabulary.resolve_category(&profile.category_text, table);
    slots
        .render_all(table.for_key(key).iter().chain(table.fill.iter()))
        .collect()
}

fn verification_candidates(profile: &StoreProfile, vocabulary: &Vocabulary, slots: &Slots) -> Vec<String> {
    let v = &vocabulary.verification;
    slots
        .render_all(v.tracked.iter())
        .chain(table_candidates(profile, vocabulary, &v.holdout, slots))
        .chain(slots.render_all(v.fallback.iter()))
        .collect()
}

/// Runs of two or more Hangul syllables.
fn hangul_words(text: &str) -> Vec<String> {
    let is_syllable = |c: char| ('\u{AC00}'..='\u{D7A3}').contains(&c);
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_syllable(c) {
            current.push(c);
            continue;
        }
        if current.chars().count() >= 2 {
            words.push(std::mem::take(&mut current));
        }
        current.clear();
    }
    if current.chars().count() >= 2 {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::builtin().unwrap()
    }

    fn profile(region: &str, category: &str) -> StoreProfile {
        StoreProfile::new(region, category, None, None, None, None).unwrap()
    }

    fn assert_disjoint(plan: &QueryPlan) {
        let sets = [&plan.seed, &plan.region_power, &plan.broad, &plan.verification];
        let mut seen = HashSet::new();
        for set in sets {
            for q in set {
                assert!(seen.insert(query_key(q)), "duplicate across phases: {q}");
            }
        }
    }

    #[test]
    fn test_seed_starts_with_category_region_combos() {
        let plan = QueryPlan::build(&profile("강남", "안경원"), &vocab());
        assert_eq!(plan.seed[0], "강남 안경원");
        assert_eq!(plan.seed[1], "강남 안경원 추천");
        assert_eq!(plan.seed.len(), SEED_MAX);
    }

    #[test]
    fn test_seed_includes_store_specific_queries() {
        let p = StoreProfile::new("강남", "안경원", None, None, Some("밝은안경"), Some("역삼동 823")).unwrap();
        let plan = QueryPlan::build(&p, &vocab());
        assert!(plan.seed.contains(&"역삼동 안경원".to_string()));
        assert!(plan.seed.contains(&"밝은안경 역삼동 후기".to_string()));
        assert_eq!(plan.seed.len(), SEED_MAX);
    }

    #[test]
    fn test_phases_disjoint_and_verification_exactly_ten() {
        let profiles = [
            profile("강남", "안경원"),
            profile("홍대", "맛집"),
            profile("서울", "카페"),
            profile("노형동", ""),
            profile("제주", "꽃집"),
            StoreProfile::new("역삼", "", Some("맛집·음식"), None, None, None).unwrap(),
            StoreProfile::new("강남", "치과", None, None, Some("하얀치과"), Some("강남구 테헤란로")).unwrap(),
        ];
        for p in &profiles {
            let plan = QueryPlan::build(p, &vocab());
            assert_disjoint(&plan);
            assert_eq!(plan.verification.len(), VERIFICATION_KEYWORDS, "{p:?}");
            assert!(plan.region_power.len() <= REGION_POWER_MAX);
            assert!(plan.broad.len() <= BROAD_MAX);
        }
    }

    #[test]
    fn test_region_power_avoids_own_category() {
        for (category, word) in [("안경원", "안경"), ("맛집", "맛집"), ("카페", "카페")] {
            let plan = QueryPlan::build(&profile("강남", category), &vocab());
            assert_eq!(plan.region_power.len(), REGION_POWER_MAX);
            assert!(plan.region_power.iter().all(|q| !q.contains(word)), "{:?}", plan.region_power);
        }
    }

    #[test]
    fn test_region_power_disjoint_from_seed_without_category() {
        let plan = QueryPlan::build(&profile("노형동", ""), &vocab());
        assert_eq!(plan.region_power.len(), REGION_POWER_MAX);
        assert!(plan.region_power.iter().all(|q| !plan.seed.contains(q)));
    }

    #[test]
    fn test_broad_uses_category_table() {
        let plan = QueryPlan::build(&profile("강남", "커피전문점"), &vocab());
        assert_eq!(plan.broad[0], "강남 디저트 맛집");
        assert_eq!(plan.broad.len(), BROAD_MAX);
    }

    #[test]
    fn test_verification_combines_tracked_and_holdout() {
        let plan = QueryPlan::build(&profile("강남", "안경원"), &vocab());
        assert_eq!(plan.verification[0], "강남 안경원 솔직후기");
        assert!(plan.verification.contains(&"강남 안경 맞추기".to_string()));
    }

    #[test]
    fn test_topic_mode_seed() {
        let p = StoreProfile::new("역삼", "", Some("카페·디저트"), None, None, None).unwrap();
        let plan = QueryPlan::build(&p, &vocab());
        assert_eq!(plan.seed[0], "역삼 카페");
        assert!(!plan.seed.iter().any(|q| q.contains("카페·디저트")));
    }

    #[test]
    fn test_case_variants_never_repeat_across_phases() {
        let mut v = vocab();
        v.seed.primary = vec!["{r} PT 후기".into(), "{r} pt 추천".into()];
        v.seed.store_specific.clear();
        v.seed.secondary.clear();
        v.verification.tracked = vec!["{r} pt 후기".into(), "{r} PT 추천".into()];

        let plan = QueryPlan::build(&profile("강남", "헬스장"), &v);
        assert_eq!(plan.seed, vec!["강남 PT 후기", "강남 pt 추천"]);
        assert!(!plan.verification.iter().any(|q| query_key(q) == "강남 pt 후기"));
        assert!(!plan.verification.iter().any(|q| query_key(q) == "강남 pt 추천"));
        assert_eq!(plan.verification.len(), VERIFICATION_KEYWORDS);
        assert_disjoint(&plan);
    }

    #[test]
    fn test_take_fresh_skips_used_case_variant() {
        let mut used = HashSet::new();
        let a = take_fresh(vec!["강남 pt 후기".to_string()], &mut used, 5);
        let b = take_fresh(vec!["강남 PT 후기".to_string(), "강남 PT 가격".to_string()], &mut used, 5);
        assert_eq!(a, vec!["강남 pt 후기"]);
        assert_eq!(b, vec!["강남 PT 가격"]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let p = profile("강남", "미용실");
        assert_eq!(QueryPlan::build(&p, &vocab()), QueryPlan::build(&p, &vocab()));
    }

    #[test]
    fn test_match_keywords() {
        let v = vocab();
        assert_eq!(
            QueryPlan::match_keywords(&profile("강남", "수제 버거"), &v),
            vec!["수제 버거", "수제", "버거"]
        );
        assert!(QueryPlan::match_keywords(&profile("강남", ""), &v).is_empty());
    }

    #[test]
    fn test_hangul_words() {
        assert_eq!(hangul_words("강남 안경원, a 안"), vec!["강남", "안경원"]);
    }
}
