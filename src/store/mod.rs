//! Durable evidence: stores, candidate profiles and exposure facts.
//!
//! [`ExposureStore`] is the persistence seam of the pipeline. Writes are
//! upserts, so replaying a run on the same day converges to the same state:
//!
//! - a store profile maps to one id
//! - a candidate profile is replaced by id
//! - an exposure fact is replaced per (store, keyword, blogger, day)
//!
//! Implementations stage writes and make them durable on [`ExposureStore::commit`].

use crate::models::{CandidateProfile, ExposureFact, FactKey, StoreProfile, StoreRecord};
use crate::utils::today;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod json;
#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown store id {0}")]
    UnknownStore(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ExposureStore {
    /// Id of the store with this profile, registering it when new.
    async fn upsert_store(&mut self, profile: &StoreProfile) -> StoreResult<u64>;

    async fn store_profile(&self, store_id: u64) -> StoreResult<Option<StoreRecord>>;

    async fn upsert_candidate_profile(&mut self, profile: CandidateProfile) -> StoreResult<()>;

    async fn candidate_profile(&self, blogger_id: &str) -> StoreResult<Option<CandidateProfile>>;

    /// Insert or overwrite the fact for its (store, keyword, blogger, day).
    async fn record_exposure_fact(&mut self, fact: ExposureFact) -> StoreResult<()>;

    /// Facts for `store_id` checked within the last `window_days` days.
    async fn read_exposure_facts(&self, store_id: u64, window_days: i64) -> StoreResult<Vec<ExposureFact>>;

    /// Facts for `blogger_id` across all stores within the window.
    async fn read_blogger_facts(&self, blogger_id: &str, window_days: i64) -> StoreResult<Vec<ExposureFact>>;

    /// Drop facts older than `keep_days`; returns how many were removed.
    async fn prune(&mut self, keep_days: i64) -> StoreResult<usize>;

    async fn commit(&mut self) -> StoreResult<()>;
}

/// First day inside a trailing window ending today.
pub fn window_start(window_days: i64, today: NaiveDate) -> NaiveDate {
    today - Duration::days(window_days.max(0))
}

/// The ledger both store implementations keep.
///
/// Facts are indexed by their upsert slot in memory and written to disk as a
/// plain list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub stores: Vec<StoreRecord>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CandidateProfile>,
    #[serde(default, with = "fact_rows")]
    pub facts: BTreeMap<FactKey, ExposureFact>,
}

mod fact_rows {
    use super::{BTreeMap, ExposureFact, FactKey};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(facts: &BTreeMap<FactKey, ExposureFact>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(facts.values())
    }

    /// Later rows win when a file holds two facts for one slot.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<FactKey, ExposureFact>, D::Error> {
        let rows = Vec::<ExposureFact>::deserialize(d)?;
        Ok(rows.into_iter().map(|f| (f.slot_key(), f)).collect())
    }
}

impl Ledger {
    pub fn upsert_store(&mut self, profile: &StoreProfile, now: DateTime<Utc>) -> u64 {
        if let Some(existing) = self.stores.iter().find(|s| &s.profile == profile) {
            return existing.store_id;
        }
        let store_id = self.stores.iter().map(|s| s.store_id).max().unwrap_or(0) + 1;
        self.stores.push(StoreRecord {
            store_id,
            profile: profile.clone(),
            created_at: now,
        });
        store_id
    }

    pub fn store(&self, store_id: u64) -> Option<&StoreRecord> {
        self.stores.iter().find(|s| s.store_id == store_id)
    }

    pub fn upsert_profile(&mut self, profile: CandidateProfile) {
        self.profiles.insert(profile.blogger_id.clone(), profile);
    }

    pub fn record_fact(&mut self, fact: ExposureFact) -> StoreResult<()> {
        if self.store(fact.store_id).is_none() {
            return Err(StoreError::UnknownStore(fact.store_id));
        }
        self.facts.insert(fact.slot_key(), fact);
        Ok(())
    }

    /// Range scan over the store's slots from `since` onward.
    pub fn facts_for_store(&self, store_id: u64, since: NaiveDate) -> Vec<ExposureFact> {
        let from = FactKey {
            store_id,
            checked_on: since,
            keyword: String::new(),
            blogger_id: String::new(),
        };
        self.facts
            .range(from..)
            .take_while(|(key, _)| key.store_id == store_id)
            .map(|(_, fact)| fact.clone())
            .collect()
    }

    pub fn facts_for_blogger(&self, blogger_id: &str, since: NaiveDate) -> Vec<ExposureFact> {
        self.facts
            .values()
            .filter(|f| f.blogger_id == blogger_id && f.checked_on >= since)
            .cloned()
            .collect()
    }

    pub fn prune(&mut self, keep_from: NaiveDate) -> usize {
        let before = self.facts.len();
        self.facts.retain(|key, _| key.checked_on >= keep_from);
        before - self.facts.len()
    }
}

/// Start of a trailing window ending today.
pub(crate) fn since(window_days: i64) -> NaiveDate {
    window_start(window_days, today())
}
