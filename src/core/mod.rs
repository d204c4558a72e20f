/// Core Module for Clubhouse
///
/// Shared infrastructure every data-access operation goes through: the
/// connection pool and statement dispatcher, bound values, error types and
/// outcome normalization.

pub mod db;
pub mod error;
pub mod outcome;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{ClubhouseError, Result};
pub use outcome::{ErrorKind, OperationCategory, OperationOutcome, QueryResult};
pub use value::{Record, SqlValue};
