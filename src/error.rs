//! Error types for the auto-cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for caches, backing services and decorators.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Item not found in the backing service
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item already exists, or a lock is held by someone else
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A caller broke the contract of an operation (bad argument, bad option combination)
    #[error("Contract violation: {0}")]
    Contract(String),

    /// A value could not be converted to or from JSON
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key/value byte store failed
    #[error("Cache store error: {0}")]
    Store(String),

    /// The store does not provide the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

// == Result Type Alias ==
/// Convenience Result type for the auto-cache library.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Contract Helpers ==
/// Fails with [`CacheError::Contract`] unless `condition` holds.
pub fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(CacheError::Contract(message()))
    }
}

/// Fails with [`CacheError::Contract`] if `value` is empty or whitespace.
pub fn require_not_blank(value: &str, name: &str) -> Result<()> {
    require(!value.trim().is_empty(), || {
        format!("Parameter {} must not be empty or whitespace", name)
    })
}
