/// Driver Module
///
/// Runs one statement on a connection and reports the driver's raw result
/// shape. Procedure calls come back wrapped the way procedure-capable drivers
/// return them: one result set per row-producing statement followed by a
/// status packet. Flattening that shape is the dispatcher's job.

use crate::core::db::procedure::ProcedureCatalog;
use crate::core::value::{json_from_value_ref, Record, SqlValue};
use crate::core::{ClubhouseError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, Connection, Statement};

static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*CALL\s+([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*;?\s*$")
        .expect("CALL pattern is a valid regex")
});

/// Outcome of a write as reported by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStatus {
    pub affected_rows: u64,
    /// Rowid generated by an INSERT that changed rows
    pub last_insert_id: Option<i64>,
}

/// Unflattened driver output
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Rows from a row-producing statement
    Rows(Vec<Record>),
    /// Status of a statement that produced no rows
    Status(WriteStatus),
    /// Procedure output: result sets and a trailing status packet
    Sets(Vec<RawResult>),
}

/// SQL statement kinds the data layer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Stored-procedure invocation
    Call,
    /// BEGIN/COMMIT/ROLLBACK/SAVEPOINT/RELEASE
    Transaction,
    Other,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword, case-insensitively.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementKind::Select,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CALL" => StatementKind::Call,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Transaction
            }
            _ => StatementKind::Other,
        }
    }
}

/// Splits `CALL name(?, ?, ...)` into the procedure name and argument count.
///
/// Arguments must all be `?` placeholders; literal arguments would put
/// request data back into the SQL text.
pub fn parse_call(sql: &str) -> Result<(String, usize)> {
    let captures = CALL_RE
        .captures(sql)
        .ok_or_else(|| ClubhouseError::Execution(format!("Malformed procedure call: {}", sql)))?;
    let name = captures[1].to_string();
    let args = captures[2].trim();
    if args.is_empty() {
        return Ok((name, 0));
    }

    let mut count = 0;
    for arg in args.split(',') {
        if arg.trim() != "?" {
            return Err(ClubhouseError::Execution(format!(
                "Procedure '{}' arguments must be bound parameters, found '{}'",
                name,
                arg.trim()
            )));
        }
        count += 1;
    }
    Ok((name, count))
}

/// Executes a statement and returns the driver's raw result.
pub fn run(
    conn: &Connection,
    catalog: &ProcedureCatalog,
    sql: &str,
    params: &[SqlValue],
) -> Result<RawResult> {
    let kind = StatementKind::from_sql(sql);
    if kind == StatementKind::Call {
        let (name, arg_count) = parse_call(sql)?;
        if arg_count != params.len() {
            return Err(ClubhouseError::Execution(format!(
                "Procedure call has {} placeholders but {} bound values",
                arg_count,
                params.len()
            )));
        }
        return catalog.invoke(conn, &name, params);
    }

    let mut stmt = conn.prepare(sql).map_err(classify)?;
    if stmt.column_count() > 0 {
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(classify)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            records.push(read_record(&columns, row)?);
        }
        Ok(RawResult::Rows(records))
    } else {
        let changed = stmt.execute(params_from_iter(params.iter())).map_err(classify)?;
        Ok(RawResult::Status(write_status(conn, kind, changed)))
    }
}

pub(crate) fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

pub(crate) fn read_record(columns: &[String], row: &rusqlite::Row<'_>) -> Result<Record> {
    let mut record = Record::new();
    for (i, column) in columns.iter().enumerate() {
        record.insert(column.clone(), json_from_value_ref(row.get_ref(i)?));
    }
    Ok(record)
}

pub(crate) fn write_status(conn: &Connection, kind: StatementKind, changed: usize) -> WriteStatus {
    WriteStatus {
        affected_rows: changed as u64,
        last_insert_id: (kind == StatementKind::Insert && changed > 0).then(|| conn.last_insert_rowid()),
    }
}

/// Separates constraint violations the guard workflow must recognize from
/// other driver failures.
pub fn classify(err: rusqlite::Error) -> ClubhouseError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return ClubhouseError::UniqueViolation(
                message.clone().unwrap_or_else(|| failure.to_string()),
            );
        }
    }
    ClubhouseError::Database(err)
}
