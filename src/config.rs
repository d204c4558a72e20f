use crate::core::db::{
    ConnectionOptions, ConnectionPool, Dispatcher, PoolConfig, ProcedureCatalog, ProcedureDefinition,
    MEMORY_PATH,
};
use crate::core::{ClubhouseError, Result};
use crate::guard::GuardMode;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section is optional; missing values fall back to the defaults of
/// the section type.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pool: PoolSettings,
    pub guard: GuardConfig,
    pub log: LogConfig,
    pub procedures: Vec<ProcedureDefinition>,
}

/// Database location and per-connection setup.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// SQL batch run on every new connection
    pub init_sql: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: MEMORY_PATH.to_string(),
            init_sql: None,
        }
    }
}

/// Pool sizing and timeouts.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    pub min_idle: usize,
    pub acquire_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        PoolSettings {
            max_size: defaults.max_size,
            min_idle: defaults.min_idle,
            acquire_timeout_ms: defaults.acquire_timeout.as_millis() as u64,
            statement_timeout_ms: defaults.statement_timeout.as_millis() as u64,
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_size,
            min_idle: self.min_idle,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            statement_timeout: Duration::from_millis(self.statement_timeout_ms),
        }
    }
}

/// Uniqueness-guard configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub mode: GuardMode,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber` filter directive, e.g. `info` or `clubhouse=debug`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Applies `CLUBHOUSE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// `ClubhouseError::Config` when an override is not a valid number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CLUBHOUSE_DB_PATH") {
            self.database.path = path;
        }
        if let Some(size) = parse_override(&lookup, "CLUBHOUSE_POOL_SIZE")? {
            self.pool.max_size = size as usize;
        }
        if let Some(ms) = parse_override(&lookup, "CLUBHOUSE_ACQUIRE_TIMEOUT_MS")? {
            self.pool.acquire_timeout_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "CLUBHOUSE_STATEMENT_TIMEOUT_MS")? {
            self.pool.statement_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let options = ConnectionOptions::new(self.database.path.clone());
        match &self.database.init_sql {
            Some(sql) => options.with_init_sql(sql.clone()),
            None => options,
        }
    }

    /// Builds the procedure catalog from the `[[procedures]]` entries.
    pub fn procedure_catalog(&self) -> Result<ProcedureCatalog> {
        ProcedureCatalog::from_definitions(self.procedures.iter().cloned())
    }

    /// Opens the pool and wires it into a dispatcher.
    pub fn build_dispatcher(&self) -> Result<Dispatcher> {
        let pool = ConnectionPool::new(self.pool.to_pool_config(), self.connection_options())?;
        let catalog = self.procedure_catalog()?;
        info!(
            "Opened pool on {} with {} procedures",
            self.database.path,
            catalog.len()
        );
        Ok(Dispatcher::new(Arc::new(pool), Arc::new(catalog)))
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ClubhouseError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))),
        None => Ok(None),
    }
}

/// Parses configuration text without applying environment overrides.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from a TOML file at the given path, then applies
/// `CLUBHOUSE_*` environment overrides.
///
/// # Example
///
/// ```no_run
/// let config = clubhouse::config::load_config("clubhouse.toml").expect("Failed to load config");
/// println!("{:?}", config.pool);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE_CONFIG: &str = r#"
[database]
path = "/var/lib/clubhouse/clubhouse.db"
init_sql = "PRAGMA journal_mode = WAL;"

[pool]
max_size = 4
min_idle = 0
acquire_timeout_ms = 250

[guard]
mode = "check_then_write"

[log]
level = "clubhouse=debug"

[[procedures]]
name = "sp_ping"
body = ["SELECT 1 AS pong"]

[[procedures]]
name = "sp_rename"
params = ["id", "name"]
body = ["UPDATE t SET name = :name WHERE id = :id"]
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = parse_config(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert_eq!(config.database.path, "/var/lib/clubhouse/clubhouse.db");
        assert_eq!(config.database.init_sql.as_deref(), Some("PRAGMA journal_mode = WAL;"));
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.min_idle, 0);
        assert_eq!(config.pool.acquire_timeout_ms, 250);
        // Unset keys keep their defaults.
        assert_eq!(config.pool.statement_timeout_ms, 30_000);
        assert_eq!(config.guard.mode, GuardMode::CheckThenWrite);
        assert_eq!(config.log.level, "clubhouse=debug");
        assert_eq!(config.procedures.len(), 2);
        assert!(config.procedures[0].params.is_empty());
        assert_eq!(config.procedure_catalog().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.database.path, MEMORY_PATH);
        assert_eq!(config.pool.to_pool_config(), PoolConfig::default());
        assert_eq!(config.guard.mode, GuardMode::Transaction);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CLUBHOUSE_DB_PATH", "/tmp/override.db"),
            ("CLUBHOUSE_POOL_SIZE", "16"),
            ("CLUBHOUSE_STATEMENT_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();
        let mut config = parse_config(SAMPLE_CONFIG).unwrap();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.pool.max_size, 16);
        assert_eq!(config.pool.acquire_timeout_ms, 250);
        assert_eq!(config.pool.statement_timeout_ms, 1500);
    }

    #[test]
    fn test_invalid_override_is_a_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "CLUBHOUSE_POOL_SIZE").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ClubhouseError::Config(_)));
    }

    #[test]
    fn test_unknown_guard_mode_is_rejected() {
        let result = parse_config("[guard]\nmode = \"optimistic\"\n");
        assert!(matches!(result, Err(ClubhouseError::Toml(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubhouse.toml");
        std::fs::write(&path, "[pool]\nmax_size = 3\n").unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.pool.max_size == 3 || std::env::var("CLUBHOUSE_POOL_SIZE").is_ok());

        let missing = load_config(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ClubhouseError::Io(_))));
    }

    #[test]
    fn test_build_dispatcher() {
        let config = parse_config(SAMPLE_CONFIG).unwrap();
        let mut config = config;
        config.database.path = MEMORY_PATH.to_string();
        config.database.init_sql = Some("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, name TEXT);".to_string());
        let dispatcher = config.build_dispatcher().unwrap();
        // An in-memory database is held by a single connection.
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(dispatcher.pool().status().max_size, 1);
        assert!(dispatcher.catalog().get("sp_ping").is_some());
    }
}
