/// Statement Dispatcher Module
///
/// Executes compiled statements on pooled connections. Every other component
/// sees a flat [`StatementResult`]; the nested result shape of procedure
/// calls is unwrapped here and nowhere else.

use crate::core::db::driver::{self, RawResult, StatementKind};
use crate::core::db::pool::ConnectionPool;
use crate::core::db::procedure::ProcedureCatalog;
use crate::core::value::Record;
use crate::core::{ClubhouseError, Result};
use crate::query::CompiledStatement;
use rusqlite::Connection;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Column procedures and `RETURNING` clauses use to report a generated id
pub const ID_COLUMN: &str = "id";

/// Flattened result of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// Rows of the first result set
    pub rows: Vec<Record>,
    /// Rows changed by the statement (summed over a procedure body)
    pub affected_rows: u64,
    /// Rowid generated by an inserting statement
    pub last_insert_id: Option<i64>,
}

impl StatementResult {
    /// Id produced by a write: the `id` column of the first row when the
    /// statement returned one, otherwise the driver's generated rowid.
    pub fn generated_id(&self) -> Option<i64> {
        self.rows
            .first()
            .and_then(|row| row.get(ID_COLUMN))
            .and_then(|id| id.as_i64())
            .or(self.last_insert_id)
    }
}

/// Unwraps one level of result-set nesting.
///
/// Procedure output keeps its first result set and the trailing status
/// packet; additional result sets are dropped.
pub fn flatten(raw: RawResult) -> StatementResult {
    match raw {
        RawResult::Rows(rows) => StatementResult {
            rows,
            ..StatementResult::default()
        },
        RawResult::Status(status) => StatementResult {
            rows: Vec::new(),
            affected_rows: status.affected_rows,
            last_insert_id: status.last_insert_id,
        },
        RawResult::Sets(sets) => {
            let mut result = StatementResult::default();
            let mut seen_rows = false;
            for set in sets {
                match set {
                    RawResult::Rows(rows) if !seen_rows => {
                        result.rows = rows;
                        seen_rows = true;
                    }
                    RawResult::Rows(rows) => {
                        debug!("Dropping extra result set of {} rows", rows.len());
                    }
                    RawResult::Status(status) => {
                        result.affected_rows = status.affected_rows;
                        result.last_insert_id = status.last_insert_id;
                    }
                    RawResult::Sets(_) => debug!("Ignoring nested result sets"),
                }
            }
            result
        }
    }
}

/// Executes statements through the shared pool
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
    catalog: Arc<ProcedureCatalog>,
}

impl Dispatcher {
    pub fn new(pool: Arc<ConnectionPool>, catalog: Arc<ProcedureCatalog>) -> Self {
        Dispatcher { pool, catalog }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn catalog(&self) -> &ProcedureCatalog {
        &self.catalog
    }

    /// Leases a connection, runs the statement and releases the connection
    /// before returning, on success and failure alike.
    ///
    /// # Errors
    ///
    /// - `ClubhouseError::PoolExhausted` when no connection can be leased
    /// - `ClubhouseError::UniqueViolation` for UNIQUE/PRIMARY KEY conflicts
    /// - `ClubhouseError::Database` and friends for every other failure
    pub fn execute(&self, statement: &CompiledStatement) -> Result<StatementResult> {
        let conn = self.pool.acquire()?;
        let result = self.execute_in(&conn, statement);
        conn.release();
        result
    }

    /// Runs a statement on a connection the caller already holds.
    pub fn execute_in(&self, conn: &Connection, statement: &CompiledStatement) -> Result<StatementResult> {
        let started = Instant::now();
        let is_call = StatementKind::from_sql(&statement.sql) == StatementKind::Call;
        debug!("Dispatching {}", statement);

        match driver::run(conn, &self.catalog, &statement.sql, &statement.params) {
            Ok(raw) => {
                let result = match raw {
                    RawResult::Sets(_) if is_call => flatten(raw),
                    RawResult::Sets(_) => {
                        return Err(ClubhouseError::Execution(
                            "nested result sets from a non-procedure statement".to_string(),
                        ))
                    }
                    other => flatten(other),
                };
                debug!(
                    "Statement returned {} rows, {} affected in {:?}",
                    result.rows.len(),
                    result.affected_rows,
                    started.elapsed()
                );
                Ok(result)
            }
            Err(e) => {
                error!("Statement failed: {} ({})", e, statement.sql);
                Err(e)
            }
        }
    }

    /// Runs a statement on a worker thread.
    ///
    /// The returned handle resolves exactly once.
    pub fn spawn(&self, statement: CompiledStatement) -> PendingResult {
        let (sender, receiver) = mpsc::channel();
        let dispatcher = self.clone();
        let worker = thread::spawn(move || {
            let result = dispatcher.execute(&statement);
            // The receiver may have been dropped; nobody is waiting then.
            let _ = sender.send(result);
        });
        PendingResult {
            receiver,
            worker: Some(worker),
        }
    }
}

/// Handle to a statement running on a worker thread
#[derive(Debug)]
pub struct PendingResult {
    receiver: mpsc::Receiver<Result<StatementResult>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PendingResult {
    /// Blocks until the statement finishes.
    pub fn wait(mut self) -> Result<StatementResult> {
        let result = self.receiver.recv().map_err(|_| {
            ClubhouseError::Execution("statement worker exited without a result".to_string())
        });
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result?
    }

    /// Waits up to `timeout` for the result.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Result<StatementResult>, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Returns the result if it is already available.
    pub fn try_recv(&self) -> std::result::Result<Result<StatementResult>, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }
}
