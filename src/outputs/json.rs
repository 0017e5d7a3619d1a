//! JSON report output.
//!
//! Reports are grouped per store, one file per day:
//! `{json_output_dir}/{store_id}/{date}.json`. Rebuilding a report on the
//! same day overwrites the file.

use crate::models::TieredReport;
use chrono::NaiveDate;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the report file for `store_id` on `date`.
pub fn report_path(json_output_dir: &str, store_id: u64, date: NaiveDate) -> PathBuf {
    PathBuf::from(json_output_dir)
        .join(store_id.to_string())
        .join(format!("{date}.json"))
}

/// Write a [`TieredReport`] as pretty-printed JSON.
///
/// Creates the per-store directory when missing and returns the written path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, store_id = store_id))]
pub async fn write_report(
    json_output_dir: &str,
    store_id: u64,
    date: NaiveDate,
    report: &TieredReport,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(json_output_dir, store_id, date);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(
        path = %path.display(),
        top_tier = report.top_tier.len(),
        pool = report.operational_pool.len(),
        "Wrote JSON report"
    );
    Ok(path)
}
