//! Storage error handling
//!
//! Typed errors for the persistence core. The named sentinel variants
//! (ownership, token, not-found, already-exists) are the only ones callers
//! are expected to match on; everything else is opaque and carries the
//! failing operation for context.

use thiserror::Error;

/// Errors that can occur in the persistence core
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store configuration is unusable (empty path, unopenable file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any write happened
    #[error("Validation error: {0}")]
    Validation(String),

    /// A row with the same unique value already exists
    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    /// The pixel is owned by a different user; nothing was written
    #[error("Pixel {pixel_id} is owned by another user")]
    OwnedByAnotherUser { pixel_id: i64 },

    /// An expected row is missing
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The verification token does not exist
    #[error("Verification token is invalid")]
    TokenInvalid,

    /// The verification token exists but its validity window has passed.
    /// The token is deleted as part of detecting this, so a retry reports
    /// `TokenInvalid` instead.
    #[error("Verification token has expired")]
    TokenExpired,

    /// The operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// Stored data failed to decode (malformed timestamp, unknown status)
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Underlying SQLite failure, wrapped with the failing operation
    #[error("Database error during {op}: {source}")]
    Database {
        op: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// Wrap a SQLite error with the name of the failing operation
    pub fn db(op: impl Into<String>, source: rusqlite::Error) -> Self {
        StoreError::Database {
            op: op.into(),
            source,
        }
    }

    /// True if the underlying SQLite error is a UNIQUE constraint violation
    pub fn is_unique_violation(&self) -> bool {
        self.extended_code() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    }

    /// True if the underlying SQLite error is a FOREIGN KEY violation
    pub fn is_foreign_key_violation(&self) -> bool {
        self.extended_code() == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
    }

    fn extended_code(&self) -> Option<i32> {
        match self {
            StoreError::Database {
                source: rusqlite::Error::SqliteFailure(e, _),
                ..
            } => Some(e.extended_code),
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
