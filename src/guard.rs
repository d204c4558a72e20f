/// Create-with-uniqueness-guard workflow.
///
/// Every create/update path runs the same protocol:
///
/// ```text
/// Checking ──conflict──▶ Conflict ──▶ Failure(AlreadyExists)
///     │
///     └──no conflict──▶ Proceeding ──▶ Success(id) | Failure(WriteRejected | ExecutionFailure)
/// ```
///
/// In [`GuardMode::Transaction`] the check and the write share one leased
/// connection inside `BEGIN IMMEDIATE`, so no other writer can slip in
/// between them, and a UNIQUE violation raised by the write itself still
/// reports `AlreadyExists`. [`GuardMode::CheckThenWrite`] runs them as two
/// independent round-trips; concurrent callers can then both pass the check.

use crate::core::db::Dispatcher;
use crate::core::outcome::{ErrorKind, OperationOutcome};
use crate::core::value::SqlValue;
use crate::core::{ClubhouseError, Result};
use crate::query::{is_field_reference, is_identifier, CompiledStatement};
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// Check and write in one immediate transaction
    #[default]
    Transaction,
    /// Check and write as separate statements on separate leases
    CheckThenWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Conflict,
    Proceeding,
    Failure,
    Success,
}

/// The statements of one guarded write
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedWrite {
    /// What is being written, for logs and conflict messages
    pub label: String,
    /// Returns one row per conflicting record
    pub check: CompiledStatement,
    /// Produces the id of the written row
    pub write: CompiledStatement,
}

/// Duplicate-detection query over a natural key
///
/// Key columns are compared with `IS`, so a NULL parent matches NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCheck<'a> {
    pub table: &'a str,
    pub key: Vec<(&'a str, SqlValue)>,
    /// Row to ignore when updating
    pub exclude_id: Option<i64>,
}

impl DuplicateCheck<'_> {
    pub fn compile(&self) -> Result<CompiledStatement> {
        if !is_identifier(self.table) {
            return Err(ClubhouseError::Validation(format!("invalid table '{}'", self.table)));
        }
        if self.key.is_empty() {
            return Err(ClubhouseError::Validation(format!(
                "duplicate check on '{}' has no key columns",
                self.table
            )));
        }

        let mut conditions = Vec::with_capacity(self.key.len() + 1);
        let mut params = Vec::with_capacity(self.key.len() + 1);
        for (column, value) in &self.key {
            if !is_field_reference(column) {
                return Err(ClubhouseError::Validation(format!("invalid key column '{}'", column)));
            }
            conditions.push(format!("{} IS ?", column));
            params.push(value.clone());
        }
        if let Some(id) = self.exclude_id {
            conditions.push("id <> ?".to_string());
            params.push(SqlValue::Integer(id));
        }

        Ok(CompiledStatement::new(
            format!("SELECT id FROM {} WHERE {} LIMIT 1", self.table, conditions.join(" AND ")),
            params,
        ))
    }
}

/// Runs guarded writes through a dispatcher
#[derive(Debug, Clone)]
pub struct UniquenessGuard<'a> {
    dispatcher: &'a Dispatcher,
    mode: GuardMode,
}

impl<'a> UniquenessGuard<'a> {
    pub fn new(dispatcher: &'a Dispatcher, mode: GuardMode) -> Self {
        UniquenessGuard { dispatcher, mode }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Runs the check and, when nothing conflicts, the write.
    pub fn run(&self, op: &GuardedWrite) -> OperationOutcome<i64> {
        let outcome = match self.mode {
            GuardMode::Transaction => self.run_in_transaction(op),
            GuardMode::CheckThenWrite => self.run_unguarded(op),
        };
        let state = if outcome.is_success() {
            GuardState::Success
        } else {
            GuardState::Failure
        };
        debug!("Guarded write of {} finished in {:?}", op.label, state);
        outcome
    }

    fn run_in_transaction(&self, op: &GuardedWrite) -> OperationOutcome<i64> {
        let mut conn = match self.dispatcher.pool().acquire() {
            Ok(conn) => conn,
            Err(e) => return e.into(),
        };
        let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(e) => return ClubhouseError::from(e).into(),
        };

        let outcome = self.check_then_write(op, |statement| self.dispatcher.execute_in(&tx, statement));
        if outcome.is_success() {
            if let Err(e) = tx.commit() {
                return ClubhouseError::from(e).into();
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        outcome
    }

    fn run_unguarded(&self, op: &GuardedWrite) -> OperationOutcome<i64> {
        self.check_then_write(op, |statement| self.dispatcher.execute(statement))
    }

    fn check_then_write<F>(&self, op: &GuardedWrite, execute: F) -> OperationOutcome<i64>
    where
        F: Fn(&CompiledStatement) -> Result<crate::core::db::StatementResult>,
    {
        debug!("Guarded write of {}: {:?}", op.label, GuardState::Checking);
        let existing = match execute(&op.check) {
            Ok(result) => result,
            Err(e) => return e.into(),
        };
        if !existing.rows.is_empty() {
            warn!("Guarded write of {}: {:?}", op.label, GuardState::Conflict);
            return OperationOutcome::failure(
                ErrorKind::AlreadyExists,
                format!("{} already exists", op.label),
            );
        }

        debug!("Guarded write of {}: {:?}", op.label, GuardState::Proceeding);
        match execute(&op.write) {
            Ok(result) => match result.generated_id() {
                Some(id) => OperationOutcome::Success(id),
                None => OperationOutcome::failure(
                    ErrorKind::WriteRejected,
                    format!("write of {} produced no id", op.label),
                ),
            },
            Err(ClubhouseError::UniqueViolation(detail)) => {
                warn!("Guarded write of {} hit a unique constraint: {}", op.label, detail);
                OperationOutcome::failure(ErrorKind::AlreadyExists, format!("{} already exists", op.label))
            }
            Err(e) => e.into(),
        }
    }
}
