/// Procedure catalog.
///
/// SQLite has no stored procedures, so the driver layer hosts them: each
/// routine is a name, an ordered parameter signature and a body of SQL
/// statements that refer to parameters as `:name`. Invoking one runs the body
/// inside a savepoint and returns the nested result shape of a procedure call.

use crate::core::db::driver::{classify, column_names, read_record, write_status, RawResult, StatementKind, WriteStatus};
use crate::core::value::SqlValue;
use crate::core::{ClubhouseError, Result};
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const SAVEPOINT: &str = "clubhouse_call";

/// A hosted routine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcedureDefinition {
    pub name: String,
    /// Parameter names in calling order
    #[serde(default)]
    pub params: Vec<String>,
    /// Statements executed in order
    pub body: Vec<String>,
}

impl ProcedureDefinition {
    pub fn new<P, B>(name: impl Into<String>, params: P, body: B) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        ProcedureDefinition {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            body: body.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !crate::query::is_identifier(&self.name) {
            return Err(ClubhouseError::Config(format!(
                "invalid procedure name '{}'",
                self.name
            )));
        }
        if self.body.is_empty() {
            return Err(ClubhouseError::Config(format!(
                "procedure '{}' has an empty body",
                self.name
            )));
        }
        for (i, param) in self.params.iter().enumerate() {
            if !crate::query::is_identifier(param) {
                return Err(ClubhouseError::Config(format!(
                    "procedure '{}' has invalid parameter name '{}'",
                    self.name, param
                )));
            }
            if self.params[..i].contains(param) {
                return Err(ClubhouseError::Config(format!(
                    "procedure '{}' declares parameter '{}' twice",
                    self.name, param
                )));
            }
        }
        Ok(())
    }
}

/// Registry of hosted routines, keyed case-insensitively by name
#[derive(Debug, Clone, Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<String, ProcedureDefinition>,
}

impl ProcedureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from definitions, rejecting invalid ones.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ProcedureDefinition>) -> Result<Self> {
        let mut catalog = ProcedureCatalog::new();
        for definition in definitions {
            catalog.register(definition)?;
        }
        Ok(catalog)
    }

    /// Adds or replaces a routine.
    pub fn register(&mut self, definition: ProcedureDefinition) -> Result<()> {
        definition.validate()?;
        debug!(
            "Registered procedure {}({})",
            definition.name,
            definition.params.join(", ")
        );
        self.procedures
            .insert(definition.name.to_ascii_lowercase(), definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProcedureDefinition> {
        self.procedures.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Runs a routine with positional arguments.
    ///
    /// The result is `RawResult::Sets`: one `Rows` entry per row-producing
    /// body statement, then a `Status` entry with the total affected rows and
    /// the id generated by the last inserting statement. A failing statement
    /// rolls back everything the body did.
    pub fn invoke(&self, conn: &Connection, name: &str, args: &[SqlValue]) -> Result<RawResult> {
        let procedure = self
            .get(name)
            .ok_or_else(|| ClubhouseError::UnknownProcedure(name.to_string()))?;
        if procedure.params.len() != args.len() {
            return Err(ClubhouseError::Arity {
                name: procedure.name.clone(),
                expected: procedure.params.len(),
                actual: args.len(),
            });
        }

        conn.execute_batch(&format!("SAVEPOINT {}", SAVEPOINT))?;
        match self.run_body(conn, procedure, args) {
            Ok(sets) => {
                conn.execute_batch(&format!("RELEASE {}", SAVEPOINT))?;
                Ok(RawResult::Sets(sets))
            }
            Err(e) => {
                conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", SAVEPOINT))?;
                Err(e)
            }
        }
    }

    fn run_body(
        &self,
        conn: &Connection,
        procedure: &ProcedureDefinition,
        args: &[SqlValue],
    ) -> Result<Vec<RawResult>> {
        let mut sets = Vec::new();
        let mut status = WriteStatus::default();

        for sql in &procedure.body {
            let mut stmt = conn.prepare(sql).map_err(classify)?;
            for index in 1..=stmt.parameter_count() {
                let value = match stmt.parameter_name(index) {
                    Some(param) => lookup(procedure, args, param)?,
                    None => {
                        return Err(ClubhouseError::Execution(format!(
                            "procedure '{}' uses a positional placeholder; use :name",
                            procedure.name
                        )))
                    }
                };
                stmt.raw_bind_parameter(index, value)?;
            }

            if stmt.column_count() > 0 {
                let columns = column_names(&stmt);
                let mut rows = stmt.raw_query();
                let mut records = Vec::new();
                while let Some(row) = rows.next().map_err(classify)? {
                    records.push(read_record(&columns, row)?);
                }
                sets.push(RawResult::Rows(records));
            } else {
                let changed = stmt.raw_execute().map_err(classify)?;
                let step = write_status(conn, StatementKind::from_sql(sql), changed);
                status.affected_rows += step.affected_rows;
                if step.last_insert_id.is_some() {
                    status.last_insert_id = step.last_insert_id;
                }
            }
        }

        sets.push(RawResult::Status(status));
        Ok(sets)
    }
}

fn lookup<'a>(procedure: &ProcedureDefinition, args: &'a [SqlValue], param: &str) -> Result<&'a SqlValue> {
    let bare = param.trim_start_matches([':', '@', '$']);
    procedure
        .params
        .iter()
        .position(|p| p == bare)
        .map(|i| &args[i])
        .ok_or_else(|| {
            ClubhouseError::Execution(format!(
                "procedure '{}' references undeclared parameter '{}'",
                procedure.name, bare
            ))
        })
}
