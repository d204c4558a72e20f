/// Facilities: grounds, halls and courts owned by an organization.
///
/// `sp_facility_save(id, organization_id, name, address, city, capacity)`.

use super::{is_blank, EntityTable, Repository};
use crate::core::db::Dispatcher;
use crate::core::outcome::{OperationOutcome, QueryResult};
use crate::core::ClubhouseError;
use crate::guard::GuardMode;
use crate::query::{Comparison, FilterSpec, PageSpec, ProcedureSignature};
use serde::{Deserialize, Serialize};

pub const SAVE: ProcedureSignature = ProcedureSignature::new(
    "sp_facility_save",
    &["id", "organization_id", "name", "address", "city", "capacity"],
);

const TABLE: EntityTable = EntityTable {
    label: "facility",
    table: "facilities",
    columns: "id, organization_id, name, address, city, capacity",
    save: SAVE,
    natural_key: &["name", "organization_id"],
    order_by: "name, id",
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Facility {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FacilityInput {
    pub organization_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub capacity: Option<i64>,
}

/// Search request: a free-text `term` matched against name or city,
/// within one organization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FacilitySearch {
    pub term: Option<String>,
    pub organization_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl FacilitySearch {
    pub fn to_filter(&self) -> FilterSpec {
        FilterSpec::new()
            .any("name", Comparison::Prefix, self.term.clone())
            .any("city", Comparison::Prefix, self.term.clone())
            .all("organization_id", Comparison::Equals, self.organization_id)
    }
}

#[derive(Debug, Clone)]
pub struct FacilityRepository {
    repo: Repository,
}

impl FacilityRepository {
    pub fn new(dispatcher: Dispatcher, guard_mode: GuardMode) -> Self {
        FacilityRepository {
            repo: Repository::new(dispatcher, guard_mode, TABLE),
        }
    }

    pub fn find_by_id(&self, id: i64) -> OperationOutcome<Facility> {
        self.repo.find_by_id(id)
    }

    pub fn search(&self, search: &FacilitySearch) -> OperationOutcome<QueryResult> {
        match PageSpec::from_optional(search.page, search.page_size) {
            Ok(page) => self.repo.search(&search.to_filter(), page),
            Err(e) => e.into(),
        }
    }

    pub fn create(&self, input: &FacilityInput) -> OperationOutcome<i64> {
        if let Err(e) = validate(input) {
            return e.into();
        }
        self.repo.save(input, None)
    }

    pub fn update(&self, id: i64, input: &FacilityInput) -> OperationOutcome<i64> {
        if let Err(e) = validate(input) {
            return e.into();
        }
        self.repo.save(input, Some(id))
    }

    pub fn remove(&self, id: i64) -> OperationOutcome<u64> {
        self.repo.remove(id)
    }
}

fn validate(input: &FacilityInput) -> crate::core::Result<()> {
    if is_blank(&input.name) {
        return Err(ClubhouseError::Validation("facility name is required".to_string()));
    }
    if matches!(input.capacity, Some(c) if c < 0) {
        return Err(ClubhouseError::Validation("facility capacity cannot be negative".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::ErrorKind;
    use crate::test_utils::sample_dispatcher;

    fn repo() -> FacilityRepository {
        FacilityRepository::new(sample_dispatcher(), GuardMode::Transaction)
    }

    fn park(organization_id: i64) -> FacilityInput {
        FacilityInput {
            organization_id,
            name: "Riverside Park".to_string(),
            address: Some("1 Mill Lane".to_string()),
            city: Some("Easton".to_string()),
            capacity: Some(1200),
        }
    }

    #[test]
    fn test_search_term_matches_name_or_city() {
        let repo = repo();
        let by_city = FacilitySearch {
            term: Some("East".to_string()),
            ..FacilitySearch::default()
        };
        match repo.search(&by_city) {
            OperationOutcome::Success(result) => {
                assert_eq!(result.total_count, 1);
                assert_eq!(result.decode::<Facility>().unwrap()[0].capacity, Some(1200));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let other_org = FacilitySearch {
            term: Some("River".to_string()),
            organization_id: Some(2),
            ..FacilitySearch::default()
        };
        assert_eq!(repo.search(&other_org), OperationOutcome::Success(QueryResult::default()));
    }

    #[test]
    fn test_duplicate_facility() {
        let repo = repo();
        assert_eq!(repo.create(&park(1)).error_kind(), Some(ErrorKind::AlreadyExists));
        assert!(repo.create(&park(2)).is_success());
    }

    #[test]
    fn test_update_own_row() {
        let repo = repo();
        let mut bigger = park(1);
        bigger.capacity = Some(1500);
        assert_eq!(repo.update(1, &bigger), OperationOutcome::Success(1));
        match repo.find_by_id(1) {
            OperationOutcome::Success(facility) => assert_eq!(facility.capacity, Some(1500)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_negative_capacity() {
        let mut input = park(2);
        input.capacity = Some(-5);
        assert_eq!(repo().create(&input).error_kind(), Some(ErrorKind::ValidationRejected));
    }
}
