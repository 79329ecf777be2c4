//! Storage-layer errors shared by every backend.

use crate::types::metric::MetricKind;

use super::error_code::{self, TallyErrorCode};

/// Errors that can occur in the storage layer.
///
/// `Clone` because one flush outcome is handed to every writer that waited on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Metric {kind}/{id} not found")]
    NotFound { kind: MetricKind, id: String },

    #[error("Unsupported metric type: {kind}")]
    Unsupported { kind: String },

    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("Storage is closed")]
    Closed,

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl StorageError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Connectivity and disk failures; surfaced unchanged, never retried here.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::SqliteError { .. } | Self::Io { .. } | Self::Timeout { .. } | Self::Closed
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl TallyErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => error_code::VALIDATION_ERROR,
            Self::NotFound { .. } => error_code::NOT_FOUND,
            Self::Unsupported { .. } => error_code::UNSUPPORTED_KIND,
            Self::SqliteError { .. } => error_code::STORAGE_ERROR,
            Self::Io { .. } => error_code::IO_ERROR,
            Self::Serialization { .. } => error_code::SERIALIZATION_ERROR,
            Self::Timeout { .. } => error_code::TIMEOUT,
            Self::Closed => error_code::STORAGE_CLOSED,
            Self::Config { .. } => error_code::CONFIG_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_family_is_classified() {
        assert!(StorageError::SqliteError { message: "x".into() }.is_backend());
        assert!(StorageError::Closed.is_backend());
        assert!(!StorageError::validation("x").is_backend());
        assert!(!StorageError::NotFound {
            kind: MetricKind::Gauge,
            id: "g".into()
        }
        .is_backend());
    }

    #[test]
    fn not_found_message_names_kind_and_id() {
        let e = StorageError::NotFound {
            kind: MetricKind::Counter,
            id: "PollCount".into(),
        };
        assert_eq!(e.to_string(), "Metric counter/PollCount not found");
        assert_eq!(e.error_code(), error_code::NOT_FOUND);
    }
}
