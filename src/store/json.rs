//! Ledger persisted as one pretty-printed JSON file.
//!
//! Writes go to the in-memory ledger; [`ExposureStore::commit`] writes the
//! whole ledger to `<path>.tmp` and renames it over `<path>`, so a crash
//! mid-write leaves the previous file intact.

use super::{ExposureStore, Ledger, StoreResult, since};
use crate::models::{CandidateProfile, ExposureFact, StoreProfile, StoreRecord};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    ledger: Ledger,
    dirty: bool,
}

impl JsonFileStore {
    /// Load the ledger at `path`, or start an empty one if the file is missing.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let ledger = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            stores = ledger.stores.len(),
            profiles = ledger.profiles.len(),
            facts = ledger.facts.len(),
            "ledger opened"
        );
        Ok(Self {
            path,
            ledger,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl ExposureStore for JsonFileStore {
    async fn upsert_store(&mut self, profile: &StoreProfile) -> StoreResult<u64> {
        let before = self.ledger.stores.len();
        let id = self.ledger.upsert_store(profile, Utc::now());
        self.dirty |= self.ledger.stores.len() != before;
        Ok(id)
    }

    async fn store_profile(&self, store_id: u64) -> StoreResult<Option<StoreRecord>> {
        Ok(self.ledger.store(store_id).cloned())
    }

    async fn upsert_candidate_profile(&mut self, profile: CandidateProfile) -> StoreResult<()> {
        self.ledger.upsert_profile(profile);
        self.dirty = true;
        Ok(())
    }

    async fn candidate_profile(&self, blogger_id: &str) -> StoreResult<Option<CandidateProfile>> {
        Ok(self.ledger.profiles.get(blogger_id).cloned())
    }

    async fn record_exposure_fact(&mut self, fact: ExposureFact) -> StoreResult<()> {
        self.ledger.record_fact(fact)?;
        self.dirty = true;
        Ok(())
    }

    async fn read_exposure_facts(&self, store_id: u64, window_days: i64) -> StoreResult<Vec<ExposureFact>> {
        Ok(self.ledger.facts_for_store(store_id, since(window_days)))
    }

    async fn read_blogger_facts(&self, blogger_id: &str, window_days: i64) -> StoreResult<Vec<ExposureFact>> {
        Ok(self.ledger.facts_for_blogger(blogger_id, since(window_days)))
    }

    async fn prune(&mut self, keep_days: i64) -> StoreResult<usize> {
        let removed = self.ledger.prune(since(keep_days));
        self.dirty |= removed > 0;
        Ok(removed)
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn commit(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&self.ledger)?;
        let tmp = self.temp_path();
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        self.dirty = false;
        info!(bytes = bytes.len(), facts = self.ledger.facts.len(), "ledger committed");
        Ok(())
    }
}
