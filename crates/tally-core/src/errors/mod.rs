//! Error types for the Tally storage engine.

pub mod error_code;
mod storage_error;

pub use storage_error::StorageError;

/// Convenience type alias.
pub type StorageResult<T> = Result<T, StorageError>;
