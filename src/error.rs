//! Crate-level error type.
//!
//! Transient search failures never reach this type: the batch fetcher turns
//! them into empty result lists. What remains is input the caller must fix,
//! fatal invariant breaches, and persistence/config/IO failures that are
//! propagated as-is.

use crate::config::ConfigError;
use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input; retrying without correcting it will fail again.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A programming error in query construction or fetch accounting. Aborts
    /// the run before anything is persisted.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
