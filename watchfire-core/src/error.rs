//! Error types for the Watchfire engine core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering lookup failures, access control, query budgets, input
//! validation, enrichment, and the record store.

use chrono::{DateTime, Utc};

/// Top-level error type for the Watchfire core library.
#[derive(Debug, thiserror::Error)]
pub enum WatchfireError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("access denied: {reason}")]
    Forbidden { reason: String },

    #[error("query budget exhausted, resets at {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("store unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
}

impl WatchfireError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Errors from the record store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient failure worth retrying (connection blip, lock timeout).
    #[error("transient store failure: {message}")]
    Transient { message: String },

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record violated an invariant the engine relies on.
    #[error("corrupt record: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

/// Errors from the text-generation collaborator.
///
/// Recovered via template fallback on best-effort paths; surfaced to the
/// caller only by explicit generate endpoints (playbook, research scan).
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("text generation unavailable: no generator configured")]
    NotConfigured,

    #[error("text generation request failed: {message}")]
    Request { message: String },

    #[error("text generation response malformed: {message}")]
    MalformedResponse { message: String },

    #[error("text generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Convenience result alias for the Watchfire core.
pub type Result<T, E = WatchfireError> = std::result::Result<T, E>;
