//! Small text, time and filesystem helpers shared across the pipeline.
//!
//! - Whitespace and case normalization used for query deduplication
//! - Provider markup stripping for search result text
//! - Truncation for log fields
//! - Output directory validation

use chrono::{DateTime, Local, NaiveDate, Utc};
use scraper::Html;
use std::collections::HashSet;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_whitespace("  강남   안경 "), "강남 안경");
/// ```
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity of a query: whitespace collapsed and case folded.
///
/// Two queries with the same key are the same search.
pub fn query_key(s: &str) -> String {
    normalize_whitespace(s).to_lowercase()
}

/// Normalize, drop empties and [`query_key`] duplicates, keep the first-seen
/// spelling in first-seen order.
pub fn dedupe_keep_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let normalized = normalize_whitespace(item.as_ref());
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.to_lowercase()) {
            out.push(normalized);
        }
    }
    out
}

/// Strip HTML tags and decode entities from provider-highlighted text.
///
/// The search provider wraps matched terms in `<b>` and escapes quotes, e.g.
/// `"<b>강남</b> 안경 &quot;후기&quot;"` becomes `"강남 안경 \"후기\""`.
pub fn strip_markup(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return s.to_string();
    }
    let fragment = Html::parse_fragment(s);
    let text = fragment.root_element().text().collect::<String>();
    normalize_whitespace(&text)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or below `max` bytes and
/// suffixed with `"…(+N bytes)"`.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Today's calendar date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Local calendar day of a UTC instant.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
