//! Blog search provider abstraction.
//!
//! - [`SearchProvider`]: one ranked lookup per query
//! - [`naver::NaverBlogClient`]: the live blog search API
//! - [`retry::RetrySearch`]: decorator adding per-attempt timeouts and backoff
//!
//! A provider failure is an `Err`, never an empty list, so callers can tell an
//! outage from a keyword with no results.

use crate::models::SearchResultItem;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
pub mod mock;
pub mod naver;
pub mod retry;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl SearchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Transport(_) | SearchError::Timeout(_) => true,
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            SearchError::Decode(_) => false,
        }
    }
}

/// Async blog search.
///
/// Implementors return hits in provider rank order, at most `limit` of them.
pub trait SearchProvider {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError>;
}

impl<T: SearchProvider> SearchProvider for &T {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError> {
        (**self).search(query, limit).await
    }
}
