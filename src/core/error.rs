/// Clubhouse Error Module
///
/// This module defines the error types for the data-access core. Every
/// variant maps onto exactly one [`ErrorKind`] of the outcome taxonomy so
/// callers never have to inspect driver errors themselves.
use crate::core::outcome::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Error type for the clubhouse data-access core.
///
/// Covers:
/// - Pool leasing (exhaustion, shutdown)
/// - Statement execution and driver failures
/// - Procedure catalog lookups and arity mismatches
/// - Input rejected before any SQL is built
/// - Configuration loading
#[derive(Error, Debug)]
pub enum ClubhouseError {
    /// Errors raised by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection became available within the acquire timeout
    #[error("Connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// The pool has been shut down
    #[error("Connection pool is closed")]
    PoolClosed,

    /// The pool could not be built
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Statement execution failures that are not plain driver errors
    #[error("Execution error: {0}")]
    Execution(String),

    /// A UNIQUE or PRIMARY KEY constraint rejected a write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// `CALL` named a procedure the catalog does not host
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    /// Positional parameter count does not match the procedure signature
    #[error("Procedure '{name}' expects {expected} parameters, got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Input rejected before reaching the database
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding of records
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ClubhouseError {
    /// Classifies the error into the outcome taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClubhouseError::PoolExhausted { .. } | ClubhouseError::PoolClosed => {
                ErrorKind::PoolExhausted
            }
            ClubhouseError::UniqueViolation(_) => ErrorKind::AlreadyExists,
            ClubhouseError::Validation(_) => ErrorKind::ValidationRejected,
            ClubhouseError::Database(_)
            | ClubhouseError::Pool(_)
            | ClubhouseError::Execution(_)
            | ClubhouseError::UnknownProcedure(_)
            | ClubhouseError::Arity { .. }
            | ClubhouseError::Config(_)
            | ClubhouseError::Io(_)
            | ClubhouseError::Json(_)
            | ClubhouseError::Toml(_) => ErrorKind::ExecutionFailure,
        }
    }
}

/// Type alias for Result using ClubhouseError as the error type.
pub type Result<T> = std::result::Result<T, ClubhouseError>;
