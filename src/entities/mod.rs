/// Entity repositories.
///
/// Each entity is a table, a save procedure and a natural key. The shared
/// [`Repository`] turns those into the four endpoint categories: fetch by
/// id, search, guarded save and removal. Save procedures all follow the
/// same convention: a NULL `id` creates a row, a value updates that row,
/// and the routine selects the saved id last.

pub mod facility;
pub mod organization;
pub mod team;

pub use facility::{Facility, FacilityInput, FacilityRepository, FacilitySearch};
pub use organization::{Organization, OrganizationInput, OrganizationRepository, OrganizationSearch};
pub use team::{Team, TeamInput, TeamRepository, TeamSearch};

use crate::core::db::Dispatcher;
use crate::core::outcome::{normalize_fetch, normalize_listing, normalize_removal, OperationOutcome, QueryResult};
use crate::core::value::SqlValue;
use crate::core::ClubhouseError;
use crate::guard::{DuplicateCheck, GuardMode, GuardedWrite, UniquenessGuard};
use crate::query::procedure_call::format_value;
use crate::query::{CompiledStatement, FieldMap, FilterSpec, ListingQuery, PageSpec, ProcedureCall, ProcedureSignature};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Static description of one entity table
#[derive(Debug, Clone, Copy)]
pub struct EntityTable {
    /// Human-readable singular, used in messages
    pub label: &'static str,
    pub table: &'static str,
    /// Columns selected by fetch and search
    pub columns: &'static str,
    pub save: ProcedureSignature,
    /// Columns that identify a row besides its id
    pub natural_key: &'static [&'static str],
    pub order_by: &'static str,
}

impl EntityTable {
    fn select_by_id(&self, id: i64) -> CompiledStatement {
        CompiledStatement::new(
            format!("SELECT {} FROM {} WHERE id = ?", self.columns, self.table),
            vec![SqlValue::Integer(id)],
        )
    }

    fn listing_select(&self) -> String {
        format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM {}",
            self.columns, self.table
        )
    }

    fn delete_by_id(&self, id: i64) -> CompiledStatement {
        CompiledStatement::new(
            format!("DELETE FROM {} WHERE id = ?", self.table),
            vec![SqlValue::Integer(id)],
        )
    }
}

/// Shared operations over one [`EntityTable`]
#[derive(Debug, Clone)]
pub struct Repository {
    dispatcher: Dispatcher,
    guard_mode: GuardMode,
    entity: EntityTable,
}

impl Repository {
    pub fn new(dispatcher: Dispatcher, guard_mode: GuardMode, entity: EntityTable) -> Self {
        Repository {
            dispatcher,
            guard_mode,
            entity,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn entity(&self) -> &EntityTable {
        &self.entity
    }

    /// Zero rows is `NotFound`.
    pub fn find_by_id<T: DeserializeOwned>(&self, id: i64) -> OperationOutcome<T> {
        normalize_fetch(self.dispatcher.execute(&self.entity.select_by_id(id)))
    }

    /// Zero rows is a successful empty listing.
    pub fn search(&self, filter: &FilterSpec, page: Option<PageSpec>) -> OperationOutcome<QueryResult> {
        let select = self.entity.listing_select();
        let statement = ListingQuery {
            select: &select,
            filter,
            order_by: Some(self.entity.order_by),
            page,
        }
        .compile();
        match statement {
            Ok(statement) => normalize_listing(self.dispatcher.execute(&statement)),
            Err(e) => e.into(),
        }
    }

    /// Runs the save procedure behind the uniqueness guard. `id` is `None`
    /// for a create; an update skips its own row in the duplicate check.
    pub fn save<I: Serialize>(&self, input: &I, id: Option<i64>) -> OperationOutcome<i64> {
        let mut fields = match serde_json::to_value(input) {
            Ok(serde_json::Value::Object(fields)) => fields,
            Ok(other) => {
                return ClubhouseError::Validation(format!(
                    "{} input must be a field map, got {}",
                    self.entity.label, other
                ))
                .into()
            }
            Err(e) => return ClubhouseError::from(e).into(),
        };
        fields.insert("id".to_string(), id.map_or(serde_json::Value::Null, serde_json::Value::from));

        let op = match self.guarded_write(&fields, id) {
            Ok(op) => op,
            Err(e) => return e.into(),
        };
        UniquenessGuard::new(&self.dispatcher, self.guard_mode).run(&op)
    }

    /// Deleting a missing row is `NotFound`.
    pub fn remove(&self, id: i64) -> OperationOutcome<u64> {
        normalize_removal(self.dispatcher.execute(&self.entity.delete_by_id(id)))
    }

    fn guarded_write(&self, fields: &FieldMap, id: Option<i64>) -> crate::core::Result<GuardedWrite> {
        let key = self
            .entity
            .natural_key
            .iter()
            .map(|column| {
                let value = fields.get(*column).map(SqlValue::from_json);
                (*column, format_value(value.as_ref()))
            })
            .collect();
        let check = DuplicateCheck {
            table: self.entity.table,
            key,
            exclude_id: id,
        }
        .compile()?;

        let call = ProcedureCall::from_fields(&self.entity.save, fields);
        debug!("Saving {}: {}", self.entity.label, call);

        let name = fields.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(GuardedWrite {
            label: format!("{} '{}'", self.entity.label, name),
            check,
            write: call.to_statement(),
        })
    }
}

/// Whether a required request string is effectively missing
pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
