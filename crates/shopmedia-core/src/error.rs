//! Error types module
//!
//! All errors are unified under the `AppError` enum. Security-relevant
//! variants (`OwnershipMismatch`) carry full detail for server-side logs but
//! expose only a generic message through `client_message()`, so internal
//! paths and tenant ids never leak to a requester.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature. With `default-features = false` there is no database variant.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for degraded-but-recoverable outcomes
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Unrecognized storage path: {0}")]
    UnrecognizedPath(String),

    #[error("Ownership mismatch: record owner {expected} but path owner {found}")]
    OwnershipMismatch { expected: String, found: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    #[error("Partial write: {0}")]
    PartialWrite(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl AppError {
    /// Client-facing message. Sensitive variants collapse to a generic
    /// message; the full error is for server-side logs only.
    pub fn client_message(&self) -> String {
        match self {
            AppError::InvalidFilename(_) => "Invalid filename".to_string(),
            AppError::UnrecognizedPath(_) => "Not found".to_string(),
            AppError::OwnershipMismatch { .. } => "Not found".to_string(),
            AppError::NotFound(_) => "Not found".to_string(),
            AppError::InvalidImage(msg) => msg.clone(),
            AppError::PartialWrite(_) => "Upload partially processed".to_string(),
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Whether internal detail must be hidden from the requester.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            AppError::OwnershipMismatch { .. }
                | AppError::UnrecognizedPath(_)
                | AppError::Storage(_)
                | AppError::Internal(_)
        ) || self.is_database()
    }

    fn is_database(&self) -> bool {
        #[cfg(feature = "sqlx")]
        {
            matches!(self, AppError::Database(_))
        }
        #[cfg(not(feature = "sqlx"))]
        {
            false
        }
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::InvalidFilename(_) | AppError::NotFound(_) | AppError::InvalidImage(_) => {
                LogLevel::Debug
            }
            AppError::UnrecognizedPath(_) | AppError::PartialWrite(_) => LogLevel::Warn,
            AppError::OwnershipMismatch { .. } => LogLevel::Error,
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => LogLevel::Error,
            AppError::Storage(_) | AppError::Internal(_) => LogLevel::Error,
        }
    }
}
