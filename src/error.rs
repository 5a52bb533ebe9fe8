//! Error types for the Quiver library.
//!
//! Every fallible operation returns [`Result`], whose error side is the
//! [`QuiverError`] enum. The pool-specific variants mirror the ways a
//! check-in/check-out protocol can go wrong; the rest cover the storage and
//! configuration layers around it.
//!
//! # Examples
//!
//! ```
//! use quiver::error::{QuiverError, Result};
//!
//! fn claim(key: &str) -> Result<()> {
//!     Err(QuiverError::already_in_use(key))
//! }
//!
//! match claim("part-00000") {
//!     Err(e) if e.is_already_in_use() => println!("busy, try later"),
//!     Err(e) => eprintln!("Error: {}", e),
//!     Ok(_) => {}
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Quiver operations.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// The partition key is empty or malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Check-out against a key that has no registered slot.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Check-out against a key that is currently checked out.
    #[error("Already in use: {0}")]
    AlreadyInUse(String),

    /// A proxy failed to materialize its writer.
    #[error("Resource creation failed for '{key}': {reason}")]
    ResourceCreationFailed { key: String, reason: String },

    /// Closing a writer during remove, clean or replace failed.
    #[error("Resource close failed for '{key}': {reason}")]
    ResourceCloseFailed { key: String, reason: String },

    /// Raw I/O failure outside the storage layer's own classification.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage backend refused an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index writer errors
    #[error("Index error: {0}")]
    Index(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A document, config or report failed to (de)serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    /// Error from third-party code, usually a proxy closure.
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QuiverError.
pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    /// Create a new invalid key error.
    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidKey(msg.into())
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        QuiverError::NotFound(key.into())
    }

    /// Create a new already-in-use error.
    pub fn already_in_use<S: Into<String>>(key: S) -> Self {
        QuiverError::AlreadyInUse(key.into())
    }

    /// Create a new resource creation error.
    pub fn creation_failed<K: Into<String>, E: std::fmt::Display>(key: K, cause: E) -> Self {
        QuiverError::ResourceCreationFailed {
            key: key.into(),
            reason: cause.to_string(),
        }
    }

    /// Create a new resource close error.
    pub fn close_failed<K: Into<String>, E: std::fmt::Display>(key: K, cause: E) -> Self {
        QuiverError::ResourceCloseFailed {
            key: key.into(),
            reason: cause.to_string(),
        }
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuiverError::Storage(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        QuiverError::Index(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidConfig(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        QuiverError::Other(msg.into())
    }

    /// Whether this is an `AlreadyInUse` conflict, the only retryable pool error.
    pub fn is_already_in_use(&self) -> bool {
        matches!(self, QuiverError::AlreadyInUse(_))
    }

    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuiverError::NotFound(_))
    }
}
