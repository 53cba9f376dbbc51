//! Storage abstraction for basket.
//!
//! Backend crates (basket-store-sqlite, basket-store-postgres) implement [`Store`] so the
//! server never depends on a specific database engine or schema details.

mod store;
mod types;

pub use store::*;
pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    /// Transient failure (pool timeout, dropped connection). Safe to retry idempotent calls.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("pool timed out".into()).is_transient());
        assert!(!StoreError::Backend("syntax error".into()).is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Conflict.is_transient());
    }

    #[test]
    fn store_error_display() {
        assert_eq!(StoreError::NotFound.to_string(), "not found");
        assert_eq!(StoreError::AlreadyExists.to_string(), "already exists");
        assert!(StoreError::Backend("disk full".into())
            .to_string()
            .contains("disk full"));
    }
}
