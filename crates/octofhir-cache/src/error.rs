//! Error types for the cache manager.
//!
//! `CacheError` is `Clone` because a single load result, success or failure,
//! is handed to every caller that was coalesced onto it.

use std::sync::Arc;

use octofhir_kv::KvError;

/// Errors surfaced by [`CacheManager`](crate::CacheManager) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key holds the nil marker, or the loader reported no data.
    #[error("Not found: {key}")]
    NotFound {
        /// Logical cache key
        key: String,
    },

    /// The store failed (transport or protocol).
    #[error("Store error: {0}")]
    Store(#[from] KvError),

    /// Lock acquisition exhausted its retries.
    #[error("Lock busy: {key} (gave up after {attempts} attempts)")]
    LockBusy {
        /// Lock key
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// Lock acquisition was cancelled by the caller.
    #[error("Lock acquisition cancelled: {key}")]
    Cancelled {
        /// Lock key
        key: String,
    },

    /// The loader returned an error. Not cached.
    #[error("Loader failed: {0}")]
    Load(Arc<anyhow::Error>),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure
        message: String,
    },
}

impl CacheError {
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    #[must_use]
    pub fn lock_busy(key: impl Into<String>, attempts: u32) -> Self {
        Self::LockBusy {
            key: key.into(),
            attempts,
        }
    }

    #[must_use]
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled { key: key.into() }
    }

    #[must_use]
    pub fn load(error: anyhow::Error) -> Self {
        Self::Load(Arc::new(error))
    }

    #[must_use]
    pub fn serialization(error: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }

    /// True for the cached-negative / no-data outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_lock_busy(&self) -> bool {
        matches!(self, Self::LockBusy { .. })
    }

    /// True when the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transport())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
