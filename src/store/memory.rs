//! In-process ledger. Commit is a no-op; nothing survives the process.

use super::{ExposureStore, Ledger, StoreResult, since};
use crate::models::{CandidateProfile, ExposureFact, StoreProfile, StoreRecord};
use chrono::Utc;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    ledger: Ledger,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl ExposureStore for MemoryStore {
    async fn upsert_store(&mut self, profile: &StoreProfile) -> StoreResult<u64> {
        Ok(self.ledger.upsert_store(profile, Utc::now()))
    }

    async fn store_profile(&self, store_id: u64) -> StoreResult<Option<StoreRecord>> {
        Ok(self.ledger.store(store_id).cloned())
    }

    async fn upsert_candidate_profile(&mut self, profile: CandidateProfile) -> StoreResult<()> {
        self.ledger.upsert_profile(profile);
        Ok(())
    }

    async fn candidate_profile(&self, blogger_id: &str) -> StoreResult<Option<CandidateProfile>> {
        Ok(self.ledger.profiles.get(blogger_id).cloned())
    }

    async fn record_exposure_fact(&mut self, fact: ExposureFact) -> StoreResult<()> {
        self.ledger.record_fact(fact)
    }

    async fn read_exposure_facts(&self, store_id: u64, window_days: i64) -> StoreResult<Vec<ExposureFact>> {
        Ok(self.ledger.facts_for_store(store_id, since(window_days)))
    }

    async fn read_blogger_facts(&self, blogger_id: &str, window_days: i64) -> StoreResult<Vec<ExposureFact>> {
        Ok(self.ledger.facts_for_blogger(blogger_id, since(window_days)))
    }

    async fn prune(&mut self, keep_days: i64) -> StoreResult<usize> {
        Ok(self.ledger.prune(since(keep_days)))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{fact, profile};
    use super::*;
    use crate::utils::today;
    use chrono::Duration;

    #[tokio::test]
    async fn test_reads_respect_window() {
        let mut store = MemoryStore::new();
        let id = store.upsert_store(&profile()).await.unwrap();
        store.record_exposure_fact(fact(id, "k1", "a", Some(1), today())).await.unwrap();
        store
            .record_exposure_fact(fact(id, "k2", "a", Some(4), today() - Duration::days(45)))
            .await
            .unwrap();

        assert_eq!(store.read_exposure_facts(id, 30).await.unwrap().len(), 1);
        assert_eq!(store.read_exposure_facts(id, 60).await.unwrap().len(), 2);
        assert_eq!(store.read_blogger_facts("a", 30).await.unwrap().len(), 1);
        assert_eq!(store.prune(30).await.unwrap(), 1);
        assert_eq!(store.read_exposure_facts(id, 60).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_profile_roundtrip() {
        let mut store = MemoryStore::new();
        let id = store.upsert_store(&profile()).await.unwrap();
        let record = store.store_profile(id).await.unwrap().unwrap();
        assert_eq!(record.profile.region_text, "강남");
        assert!(store.store_profile(id + 1).await.unwrap().is_none());
    }
}
