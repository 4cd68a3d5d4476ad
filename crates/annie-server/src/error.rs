//! Error types at the bridge's collaborator boundaries.
//!
//! None of these escape a session: each is logged once where it is turned
//! into a degraded result.

use annie_db::StoreError;
use thiserror::Error;

/// Failure of a single store operation run off the async runtime.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BridgeError {
    /// Returns `true` if the operation failed because a row was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

/// Failure while executing an agent-requested function.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("emergency API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] BridgeError),

    #[error("call has no associated patient")]
    MissingPatient,
}
