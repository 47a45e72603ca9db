//! Typed errors surfaced by storage-provider implementations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request not found: {0}")]
    NotFound(String),
    #[error("request lock held by another worker: {0}")]
    Locked(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
