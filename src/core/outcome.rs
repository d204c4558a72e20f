/// Outcome Module
///
/// Normalizes raw statement results and errors into the uniform
/// [`OperationOutcome`] every data-access operation hands back to its caller.
/// How an empty result is treated depends on the endpoint category: listings
/// succeed with no rows, fetch-by-id fails with `NotFound`.
use crate::core::db::StatementResult;
use crate::core::error::{ClubhouseError, Result};
use crate::core::value::Record;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

/// Name of the pseudo-column listings use to report the unpaged row count.
pub const TOTAL_COUNT_COLUMN: &str = "total_count";

/// Failure taxonomy shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    PoolExhausted,
    ExecutionFailure,
    AlreadyExists,
    NotFound,
    WriteRejected,
    ValidationRejected,
}

impl ErrorKind {
    /// Conventional HTTP status for the kind. The envelope itself is built
    /// outside this crate.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::PoolExhausted => 503,
            ErrorKind::ExecutionFailure => 500,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::WriteRejected => 422,
            ErrorKind::ValidationRejected => 400,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PoolExhausted => "PoolExhausted",
            ErrorKind::ExecutionFailure => "ExecutionFailure",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::WriteRejected => "WriteRejected",
            ErrorKind::ValidationRejected => "ValidationRejected",
        };
        f.write_str(name)
    }
}

/// Result of a single data-access operation. Produced once, consumed once.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum OperationOutcome<T> {
    Success(T),
    Failure { kind: ErrorKind, message: String },
}

impl<T> OperationOutcome<T> {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        OperationOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success(_))
    }

    /// The failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationOutcome::Success(_) => None,
            OperationOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            OperationOutcome::Success(value) => OperationOutcome::Success(f(value)),
            OperationOutcome::Failure { kind, message } => OperationOutcome::Failure { kind, message },
        }
    }

    /// Converts into the `(data, errorKind)` pair HTTP handlers consume.
    pub fn into_parts(self) -> (Option<T>, Option<ErrorKind>) {
        match self {
            OperationOutcome::Success(value) => (Some(value), None),
            OperationOutcome::Failure { kind, .. } => (None, Some(kind)),
        }
    }
}

impl<T> From<ClubhouseError> for OperationOutcome<T> {
    fn from(err: ClubhouseError) -> Self {
        OperationOutcome::failure(err.kind(), err.to_string())
    }
}

/// Rows returned by a listing together with the unpaged total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub total_count: u64,
}

impl QueryResult {
    /// Builds a result from raw rows.
    ///
    /// `total_count` is taken from the `total_count` pseudo-column of the
    /// first row and stripped from every record. Without the column the
    /// row count is used; an empty row set always counts 0.
    pub fn from_rows(mut rows: Vec<Record>) -> Self {
        let reported = rows
            .first()
            .and_then(|row| row.get(TOTAL_COUNT_COLUMN))
            .and_then(|value| value.as_u64());
        for row in rows.iter_mut() {
            row.remove(TOTAL_COUNT_COLUMN);
        }
        let total_count = match reported {
            _ if rows.is_empty() => 0,
            Some(count) => count,
            None => rows.len() as u64,
        };
        QueryResult { rows, total_count }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decodes every record into a typed entity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|row| Ok(serde_json::from_value(serde_json::Value::Object(row.clone()))?))
            .collect()
    }
}

/// Endpoint categories with distinct empty-result semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    /// Search and list endpoints: zero rows is a successful empty page.
    Listing,
    /// Single-entity fetch: zero rows is `NotFound`.
    FetchById,
    /// Plain writes: success reports the affected row count.
    Write,
    /// Deletes: nothing changed means the target did not exist.
    Removal,
}

/// Payload of a normalized outcome, shaped per category.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Listing(QueryResult),
    Entity(Record),
    Affected(u64),
}

/// Shapes a raw statement result or error into an outcome.
pub fn normalize(
    category: OperationCategory,
    raw: Result<StatementResult>,
) -> OperationOutcome<Normalized> {
    let result = match raw {
        Ok(result) => result,
        Err(err) => {
            error!("{:?} operation failed: {}", category, err);
            return err.into();
        }
    };

    match category {
        OperationCategory::Listing => {
            OperationOutcome::Success(Normalized::Listing(QueryResult::from_rows(result.rows)))
        }
        OperationCategory::FetchById => match result.rows.into_iter().next() {
            Some(mut record) => {
                record.remove(TOTAL_COUNT_COLUMN);
                OperationOutcome::Success(Normalized::Entity(record))
            }
            None => OperationOutcome::failure(ErrorKind::NotFound, "no matching record"),
        },
        OperationCategory::Write => OperationOutcome::Success(Normalized::Affected(result.affected_rows)),
        OperationCategory::Removal => {
            if result.affected_rows == 0 {
                warn!("removal matched no rows");
                OperationOutcome::failure(ErrorKind::NotFound, "no matching record")
            } else {
                OperationOutcome::Success(Normalized::Affected(result.affected_rows))
            }
        }
    }
}

/// Listing normalization with the payload already unwrapped.
pub fn normalize_listing(raw: Result<StatementResult>) -> OperationOutcome<QueryResult> {
    match normalize(OperationCategory::Listing, raw) {
        OperationOutcome::Success(Normalized::Listing(result)) => OperationOutcome::Success(result),
        OperationOutcome::Success(_) => unreachable_shape(),
        OperationOutcome::Failure { kind, message } => OperationOutcome::Failure { kind, message },
    }
}

/// Fetch-by-id normalization decoded into a typed entity.
pub fn normalize_fetch<T: DeserializeOwned>(raw: Result<StatementResult>) -> OperationOutcome<T> {
    match normalize(OperationCategory::FetchById, raw) {
        OperationOutcome::Success(Normalized::Entity(record)) => {
            match serde_json::from_value(serde_json::Value::Object(record)) {
                Ok(entity) => OperationOutcome::Success(entity),
                Err(err) => ClubhouseError::from(err).into(),
            }
        }
        OperationOutcome::Success(_) => unreachable_shape(),
        OperationOutcome::Failure { kind, message } => OperationOutcome::Failure { kind, message },
    }
}

/// Removal normalization reporting the number of deleted rows.
pub fn normalize_removal(raw: Result<StatementResult>) -> OperationOutcome<u64> {
    match normalize(OperationCategory::Removal, raw) {
        OperationOutcome::Success(Normalized::Affected(count)) => OperationOutcome::Success(count),
        OperationOutcome::Success(_) => unreachable_shape(),
        OperationOutcome::Failure { kind, message } => OperationOutcome::Failure { kind, message },
    }
}

// The category fixes the payload variant; a mismatch is an internal bug,
// reported as a failure rather than a panic.
fn unreachable_shape<T>() -> OperationOutcome<T> {
    OperationOutcome::failure(ErrorKind::ExecutionFailure, "unexpected outcome shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn rows(rows: Vec<Record>) -> Result<StatementResult> {
        Ok(StatementResult {
            rows,
            ..StatementResult::default()
        })
    }

    #[test]
    fn test_listing_on_zero_rows_is_success() {
        let outcome = normalize_listing(rows(vec![]));
        assert_eq!(outcome, OperationOutcome::Success(QueryResult::default()));
    }

    #[test]
    fn test_fetch_on_zero_rows_is_not_found() {
        let outcome = normalize(OperationCategory::FetchById, rows(vec![]));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_total_count_read_from_first_row() {
        let result = QueryResult::from_rows(vec![
            record(json!({"id": 1, "total_count": 42})),
            record(json!({"id": 2, "total_count": 42})),
        ]);
        assert_eq!(result.total_count, 42);
        assert!(result.rows.iter().all(|r| !r.contains_key(TOTAL_COUNT_COLUMN)));
    }

    #[test]
    fn test_total_count_defaults_to_row_count() {
        let result = QueryResult::from_rows(vec![record(json!({"id": 1})), record(json!({"id": 2}))]);
        assert_eq!(result.total_count, 2);
        assert_eq!(QueryResult::from_rows(vec![]).total_count, 0);
    }

    #[test]
    fn test_errors_keep_their_kind() {
        let outcome = normalize(
            OperationCategory::Listing,
            Err(ClubhouseError::PoolExhausted {
                waited: std::time::Duration::from_millis(5),
            }),
        );
        assert_eq!(outcome.error_kind(), Some(ErrorKind::PoolExhausted));

        let outcome = normalize(
            OperationCategory::Write,
            Err(ClubhouseError::Execution("disk I/O error".into())),
        );
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ExecutionFailure));
    }

    #[test]
    fn test_removal_of_missing_row_is_not_found() {
        let outcome = normalize_removal(Ok(StatementResult::default()));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));

        let outcome = normalize_removal(Ok(StatementResult {
            affected_rows: 1,
            ..StatementResult::default()
        }));
        assert_eq!(outcome, OperationOutcome::Success(1));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Team {
        id: i64,
        name: String,
    }

    #[test]
    fn test_fetch_decodes_entity() {
        let outcome: OperationOutcome<Team> =
            normalize_fetch(rows(vec![record(json!({"id": 3, "name": "U12 Girls"}))]));
        assert_eq!(
            outcome,
            OperationOutcome::Success(Team {
                id: 3,
                name: "U12 Girls".to_string()
            })
        );
    }

    #[test]
    fn test_into_parts() {
        let (data, kind) = OperationOutcome::<i64>::failure(ErrorKind::WriteRejected, "no id").into_parts();
        assert_eq!(data, None);
        assert_eq!(kind, Some(ErrorKind::WriteRejected));
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
    }
}
