/// Organizations: clubs, associations and their sub-organizations.
///
/// `sp_organization_save(id, name, short_name, parent_id, email, phone)`.
/// Names are unique among siblings, so the natural key is `name` plus
/// `parent_id` (top-level organizations share the NULL parent).

use super::{is_blank, EntityTable, Repository};
use crate::core::db::Dispatcher;
use crate::core::outcome::{OperationOutcome, QueryResult};
use crate::core::ClubhouseError;
use crate::guard::GuardMode;
use crate::query::{Comparison, FilterSpec, PageSpec, ProcedureSignature};
use serde::{Deserialize, Serialize};

pub const SAVE: ProcedureSignature = ProcedureSignature::new(
    "sp_organization_save",
    &["id", "name", "short_name", "parent_id", "email", "phone"],
);

const TABLE: EntityTable = EntityTable {
    label: "organization",
    table: "organizations",
    columns: "id, name, short_name, parent_id, email, phone",
    save: SAVE,
    natural_key: &["name", "parent_id"],
    order_by: "name, id",
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub parent_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Fields accepted by create and update
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OrganizationInput {
    pub name: String,
    pub short_name: Option<String>,
    pub parent_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Search request. `name` and `short_name` match any-of by prefix;
/// `parent_id` always applies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrganizationSearch {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub parent_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl OrganizationSearch {
    pub fn to_filter(&self) -> FilterSpec {
        FilterSpec::new()
            .any("name", Comparison::Prefix, self.name.clone())
            .any("short_name", Comparison::Prefix, self.short_name.clone())
            .all("parent_id", Comparison::Equals, self.parent_id)
    }
}

#[derive(Debug, Clone)]
pub struct OrganizationRepository {
    repo: Repository,
}

impl OrganizationRepository {
    pub fn new(dispatcher: Dispatcher, guard_mode: GuardMode) -> Self {
        OrganizationRepository {
            repo: Repository::new(dispatcher, guard_mode, TABLE),
        }
    }

    pub fn find_by_id(&self, id: i64) -> OperationOutcome<Organization> {
        self.repo.find_by_id(id)
    }

    pub fn search(&self, search: &OrganizationSearch) -> OperationOutcome<QueryResult> {
        match PageSpec::from_optional(search.page, search.page_size) {
            Ok(page) => self.repo.search(&search.to_filter(), page),
            Err(e) => e.into(),
        }
    }

    /// Returns the new organization's id.
    pub fn create(&self, input: &OrganizationInput) -> OperationOutcome<i64> {
        if let Err(e) = validate(input) {
            return e.into();
        }
        self.repo.save(input, None)
    }

    pub fn update(&self, id: i64, input: &OrganizationInput) -> OperationOutcome<i64> {
        if let Err(e) = validate(input) {
            return e.into();
        }
        if input.parent_id == Some(id) {
            return ClubhouseError::Validation("an organization cannot be its own parent".to_string()).into();
        }
        self.repo.save(input, Some(id))
    }

    pub fn remove(&self, id: i64) -> OperationOutcome<u64> {
        self.repo.remove(id)
    }
}

fn validate(input: &OrganizationInput) -> crate::core::Result<()> {
    if is_blank(&input.name) {
        return Err(ClubhouseError::Validation("organization name is required".to_string()));
    }
    Ok(())
}
