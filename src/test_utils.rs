/// # Test Utilities Module
///
/// Shared fixtures for unit tests: an isolated in-memory database per test
/// with the clubhouse schema and save procedures installed, plus a few
/// assertions over pool and table state.

use crate::config::parse_config;
use crate::core::db::{ConnectionOptions, ConnectionPool, Dispatcher, PoolConfig, ProcedureCatalog};
use crate::core::Result;
use crate::query::CompiledStatement;
use std::sync::Arc;
use std::time::Duration;

pub const SCHEMA_SQL: &str = include_str!("../tests/fixtures/schema.sql");
pub const PROCEDURES_TOML: &str = include_str!("../tests/fixtures/procedures.toml");

/// Pool settings for fixtures; in-memory pools run on one connection, so
/// concurrent tests queue on it for up to the acquire timeout
pub fn test_pool_config() -> PoolConfig {
    PoolConfig {
        max_size: 4,
        min_idle: 1,
        acquire_timeout: Duration::from_secs(5),
        statement_timeout: Duration::from_secs(2),
    }
}

pub fn fixture_catalog() -> Result<ProcedureCatalog> {
    parse_config(PROCEDURES_TOML)?.procedure_catalog()
}

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub dispatcher: Dispatcher,
}

impl DatabaseFixture {
    /// Private in-memory database with the schema and procedures
    pub fn new() -> Result<Self> {
        let options = ConnectionOptions::in_memory().with_init_sql(SCHEMA_SQL);
        let pool = ConnectionPool::new(test_pool_config(), options)?;
        Ok(DatabaseFixture {
            dispatcher: Dispatcher::new(Arc::new(pool), Arc::new(fixture_catalog()?)),
        })
    }

    /// Fixture populated with two organizations, their teams and a facility
    pub fn with_sample_data() -> Result<Self> {
        let fixture = Self::new()?;
        fixture.dispatcher.pool().with_connection(|conn| {
            conn.execute_batch(
                "
                INSERT INTO organizations (id, name, short_name, email) VALUES
                    (1, 'Riverside Athletic', 'RAC', 'office@riverside.example'),
                    (2, 'Hillcrest Netball', 'HNC', NULL);
                INSERT INTO organizations (id, name, short_name, parent_id) VALUES
                    (3, 'Riverside Juniors', 'RAC-J', 1);
                INSERT INTO teams (organization_id, name, sport, age_group) VALUES
                    (1, 'Riverside Firsts', 'football', 'senior'),
                    (1, 'Riverside Reserves', 'football', 'senior'),
                    (2, 'Hillcrest Hawks', 'netball', 'U14'),
                    (3, 'Riverside Minis', 'rugby', 'U9');
                INSERT INTO facilities (organization_id, name, address, city, capacity) VALUES
                    (1, 'Riverside Park', '1 Mill Lane', 'Easton', 1200);
                ",
            )?;
            Ok(())
        })?;
        Ok(fixture)
    }
}

/// Empty fixture dispatcher, for tests that only need the schema
pub fn fixture_dispatcher() -> Dispatcher {
    match DatabaseFixture::new() {
        Ok(fixture) => fixture.dispatcher,
        Err(e) => panic!("Failed to create test database: {}", e),
    }
}

pub fn sample_dispatcher() -> Dispatcher {
    match DatabaseFixture::with_sample_data() {
        Ok(fixture) => fixture.dispatcher,
        Err(e) => panic!("Failed to create sample database: {}", e),
    }
}

/// Row count of `table`, read through the dispatcher
pub fn count_rows(dispatcher: &Dispatcher, table: &str) -> i64 {
    let statement = CompiledStatement::new(format!("SELECT COUNT(*) AS n FROM {}", table), vec![]);
    let result = dispatcher
        .execute(&statement)
        .unwrap_or_else(|e| panic!("Failed to count rows of {}: {}", table, e));
    result.rows[0]["n"].as_i64().unwrap_or_default()
}

/// Asserts that an expression is `Err` matching a `ClubhouseError` variant
#[macro_export]
macro_rules! assert_clubhouse_error {
    ($result:expr, $pattern:pat, $context:expr) => {
        match $result {
            Err($pattern) => {}
            Ok(_) => panic!("Expected {} but got Ok in {}", stringify!($pattern), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($pattern), other, $context),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClubhouseError;

    #[test]
    fn test_fixtures_are_isolated() {
        let first = sample_dispatcher();
        let second = fixture_dispatcher();
        assert_eq!(count_rows(&first, "organizations"), 3);
        assert_eq!(count_rows(&second, "organizations"), 0);
    }

    #[test]
    fn test_fixture_catalog_has_save_procedures() {
        let catalog = fixture_catalog().unwrap();
        for name in ["sp_organization_save", "sp_team_save", "sp_facility_save"] {
            assert!(catalog.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_error_macro() {
        let result: Result<()> = Err(ClubhouseError::Validation("bad".to_string()));
        assert_clubhouse_error!(result, ClubhouseError::Validation(_), "macro self-test");
    }
}
