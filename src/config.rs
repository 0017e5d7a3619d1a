//! Runtime settings and heuristic vocabularies.
//!
//! Two YAML documents drive the pipeline:
//!
//! - [`Settings`]: fetch concurrency, timeouts and retry policy, persistence
//!   limits and tiering quotas. Every section has defaults, so an empty or
//!   missing file is valid.
//! - [`Vocabulary`]: the versioned keyword tables (food and sponsorship words,
//!   franchise names, query templates). The shipped `config/vocabulary.yaml` is
//!   embedded as the built-in table and can be replaced at runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

/// Vocabulary schema version understood by this build.
pub const VOCABULARY_VERSION: u32 = 1;

const BUILTIN_VOCABULARY: &str = include_str!("../config/vocabulary.yaml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub discovery: DiscoverySettings,
    pub report: ReportSettings,
}

/// Search fan-out and per-call resilience.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Simultaneous provider calls per batch.
    pub concurrency: usize,
    /// Upper bound on a single provider attempt.
    pub attempt_timeout_secs: u64,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Result count requested for seed queries.
    pub seed_limit: u32,
    /// Result count requested for region-power and broad queries.
    pub expand_limit: u32,
    /// Result count requested for verification keywords.
    pub exposure_limit: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            attempt_timeout_secs: 10,
            max_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            seed_limit: 20,
            expand_limit: 30,
            exposure_limit: 30,
        }
    }
}

impl FetchSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Ranked candidates kept for verification and persistence.
    pub persist_top: usize,
    /// Exposure facts older than this are pruned after each run.
    pub retention_days: i64,
    /// Posts stored per candidate in the evidence summary.
    pub sample_posts: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            persist_top: 150,
            retention_days: 180,
            sample_posts: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportSettings {
    pub window_days: i64,
    pub top_tier_size: usize,
    pub pool_size: usize,
    /// Maximum share of the pool food-biased bloggers may occupy.
    pub food_cap_ratio: f64,
    /// Share of the pool reserved for non-food bloggers before backfill.
    pub nonfood_min_ratio: f64,
    pub food_bias_threshold: f64,
    pub sponsor_threshold: f64,
    pub stable_exposure_keywords: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            window_days: 30,
            top_tier_size: 20,
            pool_size: 40,
            food_cap_ratio: 0.60,
            nonfood_min_ratio: 0.30,
            food_bias_threshold: 0.60,
            sponsor_threshold: 0.40,
            stable_exposure_keywords: 4,
        }
    }
}

impl ReportSettings {
    /// Pool slots food-biased bloggers may fill (24 of 40 by default).
    pub fn food_cap(&self) -> usize {
        quota(self.pool_size, self.food_cap_ratio)
    }

    /// Pool slots reserved for non-food bloggers (12 of 40 by default).
    pub fn nonfood_min(&self) -> usize {
        quota(self.pool_size, self.nonfood_min_ratio)
    }
}

fn quota(size: usize, ratio: f64) -> usize {
    // epsilon keeps 40 * 0.6 at 24 despite binary rounding
    (size as f64 * ratio + 1e-9).floor() as usize
}

impl Settings {
    /// Load settings from a YAML file, or defaults when no path is given.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&raw)?;
        settings.validate()?;
        info!("Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::Invalid("fetch.concurrency must be at least 1".into()));
        }
        if self.report.window_days <= 0 {
            return Err(ConfigError::Invalid("report.window_days must be positive".into()));
        }
        let r = &self.report;
        if !(0.0..=1.0).contains(&r.food_cap_ratio) || !(0.0..=1.0).contains(&r.nonfood_min_ratio) {
            return Err(ConfigError::Invalid("report quota ratios must lie in [0, 1]".into()));
        }
        Ok(())
    }
}

/// Templates for one canonical category key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryTemplates {
    pub category: String,
    pub templates: Vec<String>,
}

/// Category-keyed template table with a default for unmatched categories and
/// an optional fill list used when collisions shrink the selection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplateTable {
    #[serde(default)]
    pub categories: Vec<CategoryTemplates>,
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default)]
    pub fill: Vec<String>,
}

impl TemplateTable {
    /// Templates for `key`, or the default list.
    pub fn for_key(&self, key: Option<&str>) -> &[String] {
        key.and_then(|k| self.categories.iter().find(|c| c.category == k))
            .map(|c| c.templates.as_slice())
            .unwrap_or(&self.default)
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.category.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedTemplates {
    pub primary: Vec<String>,
    #[serde(default)]
    pub store_specific: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationTemplates {
    pub tracked: Vec<String>,
    pub holdout: TemplateTable,
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicTemplates {
    pub topic: String,
    pub templates: Vec<String>,
}

/// Versioned heuristic tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Vocabulary {
    pub version: u32,
    pub food_words: Vec<String>,
    pub sponsor_words: Vec<String>,
    #[serde(default)]
    pub franchise_names: Vec<String>,
    #[serde(default)]
    pub store_suffixes: Vec<String>,
    #[serde(default)]
    pub category_synonyms: Vec<(String, String)>,
    pub seed: SeedTemplates,
    pub region_power: TemplateTable,
    pub broad: TemplateTable,
    pub verification: VerificationTemplates,
    #[serde(default)]
    pub topics: Vec<TopicTemplates>,
}

impl Vocabulary {
    /// The table shipped with the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_VOCABULARY)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let vocabulary: Vocabulary = serde_yaml::from_str(raw)?;
        vocabulary.validate()?;
        Ok(vocabulary)
    }

    /// Load from `path`, falling back to the built-in table.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let vocabulary = match path {
            Some(p) => Self::from_yaml(&std::fs::read_to_string(p)?)?,
            None => Self::builtin()?,
        };
        info!(
            version = vocabulary.version,
            food_words = vocabulary.food_words.len(),
            sponsor_words = vocabulary.sponsor_words.len(),
            "Loaded vocabulary"
        );
        Ok(vocabulary)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != VOCABULARY_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported vocabulary version {} (expected {})",
                self.version, VOCABULARY_VERSION
            )));
        }
        if self.food_words.is_empty() || self.sponsor_words.is_empty() {
            return Err(ConfigError::Invalid("food_words and sponsor_words must not be empty".into()));
        }
        if self.seed.primary.is_empty() {
            return Err(ConfigError::Invalid("seed.primary must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve free-form category text to a key of `table`.
    ///
    /// A key contained in the text wins; otherwise the first synonym found in
    /// the text maps to its canonical key, if the table has it.
    pub fn resolve_category<'a>(&self, category_text: &str, table: &'a TemplateTable) -> Option<&'a str> {
        let c = category_text.trim().to_lowercase();
        if c.is_empty() {
            return None;
        }
        if let Some(key) = table.keys().find(|k| c.contains(*k)) {
            return Some(key);
        }
        self.category_synonyms
            .iter()
            .filter(|(synonym, _)| c.contains(synonym.as_str()))
            .find_map(|(_, canonical)| table.keys().find(|k| k == canonical))
    }

    pub fn topic_templates(&self, topic: &str) -> Option<&[String]> {
        self.topics
            .iter()
            .find(|t| t.topic == topic.trim())
            .map(|t| t.templates.as_slice())
    }
}
