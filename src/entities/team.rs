/// Teams belong to exactly one organization.
///
/// `sp_team_save(id, organization_id, name, sport, age_group)`; team names
/// are unique within their organization.

use super::{is_blank, EntityTable, Repository};
use crate::core::db::Dispatcher;
use crate::core::outcome::{OperationOutcome, QueryResult};
use crate::core::value::SqlValue;
use crate::core::ClubhouseError;
use crate::guard::GuardMode;
use crate::query::{Comparison, FilterSpec, PageSpec, ProcedureSignature};
use serde::{Deserialize, Serialize};

pub const SAVE: ProcedureSignature = ProcedureSignature::new(
    "sp_team_save",
    &["id", "organization_id", "name", "sport", "age_group"],
);

const TABLE: EntityTable = EntityTable {
    label: "team",
    table: "teams",
    columns: "id, organization_id, name, sport, age_group",
    save: SAVE,
    natural_key: &["name", "organization_id"],
    order_by: "name, id",
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Team {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub sport: Option<String>,
    pub age_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TeamInput {
    pub organization_id: i64,
    pub name: String,
    pub sport: Option<String>,
    pub age_group: Option<String>,
}

/// Search request: name prefix, any of several sports, one organization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TeamSearch {
    pub name: Option<String>,
    #[serde(default)]
    pub sports: Vec<String>,
    pub organization_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl TeamSearch {
    pub fn to_filter(&self) -> FilterSpec {
        FilterSpec::new()
            .all("name", Comparison::Prefix, self.name.clone())
            .all_in("sport", self.sports.iter().cloned().map(SqlValue::from).collect())
            .all("organization_id", Comparison::Equals, self.organization_id)
    }
}

#[derive(Debug, Clone)]
pub struct TeamRepository {
    repo: Repository,
}

impl TeamRepository {
    pub fn new(dispatcher: Dispatcher, guard_mode: GuardMode) -> Self {
        TeamRepository {
            repo: Repository::new(dispatcher, guard_mode, TABLE),
        }
    }

    pub fn find_by_id(&self, id: i64) -> OperationOutcome<Team> {
        self.repo.find_by_id(id)
    }

    pub fn search(&self, search: &TeamSearch) -> OperationOutcome<QueryResult> {
        match PageSpec::from_optional(search.page, search.page_size) {
            Ok(page) => self.repo.search(&search.to_filter(), page),
            Err(e) => e.into(),
        }
    }

    pub fn create(&self, input: &TeamInput) -> OperationOutcome<i64> {
        if is_blank(&input.name) {
            return ClubhouseError::Validation("team name is required".to_string()).into();
        }
        self.repo.save(input, None)
    }

    pub fn update(&self, id: i64, input: &TeamInput) -> OperationOutcome<i64> {
        if is_blank(&input.name) {
            return ClubhouseError::Validation("team name is required".to_string()).into();
        }
        self.repo.save(input, Some(id))
    }

    pub fn remove(&self, id: i64) -> OperationOutcome<u64> {
        self.repo.remove(id)
    }
}
