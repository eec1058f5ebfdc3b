//! Persistent session token storage.
//!
//! - [`KeyValueStorage`] is the string key-value seam; [`MemoryStorage`] and
//!   [`FileStorage`] implement it.
//! - [`TokenStore`] keeps the access token, refresh token and access-token
//!   expiry in memory and writes every change through to storage.

mod clock;
mod file;
mod keys;
mod memory;
mod token_store;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use token_store::{expiry_after, migrate_legacy_keys, TokenStore, DEFAULT_REFRESH_WINDOW};
pub use traits::KeyValueStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Token lifetime too large to express as an expiry timestamp
    #[error("Token lifetime out of range: {0} minutes")]
    LifetimeOutOfRange(i64),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the file-backed storage used for persisted sessions.
pub fn create_storage(path: &Path) -> StorageResult<Box<dyn KeyValueStorage>> {
    let storage = FileStorage::open(path)?;
    Ok(Box::new(storage))
}
