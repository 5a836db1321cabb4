//! Error type shared by the stores, the evaluator and the monitors.
//!
//! Nothing here is fatal to a running monitor. Callers classify with
//! [`Error::is_transient`] (retry next cycle) and [`Error::is_not_found`]
//! (refresh and ignore).

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A store call did not finish within the configured bound.
    #[error("store call '{operation}' timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Malformed record; the item is skipped for this cycle.
    #[error("invalid {entity} {id}: {reason}")]
    Validation {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    /// A stored value that does not map to a known variant.
    #[error("cannot decode {field} value '{value}'")]
    Decode { field: &'static str, value: String },
}

impl Error {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(entity: &'static str, id: Uuid, reason: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            id,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// I/O failures that should simply be retried on the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Database(_))
    }
}

/// Runs a store future under `limit`, turning an elapsed deadline into [`Error::Timeout`].
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout {
            operation,
            elapsed: limit,
        }),
    }
}
