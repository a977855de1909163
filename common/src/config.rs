//! Service configuration.
//!
//! Everything is read from the process environment. `AppConfig` carries the
//! service level settings (bind address, pool sizing, cache bounds), while
//! `DatabaseRegistry` maps logical database keys onto warehouse connection
//! parameters.

use std::fmt;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Logical key that is always present in the registry.
pub const DEFAULT_DATABASE_KEY: &str = "default";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;
const DEFAULT_MAX_PAGE_LIMIT: u32 = 1000;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Service level settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs and health responses.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Log output format.
    pub log_format: LogFormat,
    /// Pool size per logical database key.
    pub max_connections: u32,
    /// Connect and acquire timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle connection lifetime in seconds.
    pub idle_timeout_secs: u64,
    /// Metadata cache time-to-live in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum number of entries per metadata cache table.
    pub cache_max_entries: usize,
    /// Largest accepted `limit` for table data requests.
    pub max_page_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "warehouse-service".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_format: LogFormat::Pretty,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_page_limit: DEFAULT_MAX_PAGE_LIMIT,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    pub fn load_with_service(service: &str) -> Self {
        Self::from_lookup(service, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Unparsable numeric values fall back to their defaults.
    pub fn from_lookup<F>(service: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            service_name: service.to_string(),
            host: lookup("SERVER_HOST")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.host),
            port: parse_var(&lookup, "SERVER_PORT").unwrap_or(defaults.port),
            log_format,
            max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_connections),
            connect_timeout_secs: parse_var(&lookup, "DB_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout_secs),
            idle_timeout_secs: parse_var(&lookup, "DB_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.idle_timeout_secs),
            cache_ttl_secs: parse_var(&lookup, "CACHE_TTL_SECS")
                .unwrap_or(defaults.cache_ttl_secs),
            cache_max_entries: parse_var(&lookup, "CACHE_MAX_ENTRIES")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.cache_max_entries),
            max_page_limit: parse_var(&lookup, "MAX_PAGE_LIMIT")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_page_limit),
        }
    }

    /// Pool sizing handed to the warehouse connector.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    /// Metadata cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Connection pool sizing for one logical database key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        AppConfig::default().pool_settings()
    }
}

/// Fully resolved connection parameters for one logical database key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    /// Warehouse endpoint, `host[:port]`.
    pub account: String,
    pub warehouse: String,
    pub role: String,
    pub database: String,
    /// Default schema for table lookups.
    pub schema: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Warehouse-wide credentials shared by every logical key.
#[derive(Clone, Default)]
struct BaseCredentials {
    user: String,
    password: String,
    account: String,
    warehouse: String,
    role: String,
}

/// Per-key overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub key: String,
    pub database: String,
    pub schema: String,
}

/// Static registry of logical database keys.
#[derive(Clone)]
pub struct DatabaseRegistry {
    base: BaseCredentials,
    entries: Vec<DatabaseEntry>,
}

impl fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("account", &self.base.account)
            .field("entries", &self.entries)
            .finish()
    }
}

impl DatabaseRegistry {
    /// Reads the registry from the process environment.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the registry from an arbitrary variable lookup.
    ///
    /// The `default` key comes from `WAREHOUSE_DATABASE`/`WAREHOUSE_SCHEMA`;
    /// extra keys are declared as
    /// `WAREHOUSE_DATABASES=key=DATABASE[:SCHEMA],...`.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).unwrap_or_default();

        let base = BaseCredentials {
            user: var("WAREHOUSE_USER"),
            password: var("WAREHOUSE_PASSWORD"),
            account: var("WAREHOUSE_ACCOUNT"),
            warehouse: var("WAREHOUSE_NAME"),
            role: var("WAREHOUSE_ROLE"),
        };

        let default_schema = last_segment(&var("WAREHOUSE_SCHEMA"));
        let mut entries = vec![DatabaseEntry {
            key: DEFAULT_DATABASE_KEY.to_string(),
            database: var("WAREHOUSE_DATABASE"),
            schema: default_schema.clone(),
        }];

        for entry in parse_extra_databases(&var("WAREHOUSE_DATABASES"), &default_schema)? {
            if entries.iter().any(|e| e.key == entry.key) {
                return Err(AppError::Config(format!(
                    "duplicate database key '{}' in WAREHOUSE_DATABASES",
                    entry.key
                )));
            }
            entries.push(entry);
        }

        Ok(Self { base, entries })
    }

    /// Logical keys in declaration order, `default` first.
    pub fn available_keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    /// Merges the base credentials with the overrides registered for `key`.
    ///
    /// # Errors
    /// Returns `AppError::UnknownDatabaseKey` if `key` is not registered.
    pub fn resolve(&self, key: &str) -> AppResult<DatabaseConfig> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.key == key)
            .ok_or_else(|| AppError::UnknownDatabaseKey(key.to_string()))?;

        Ok(DatabaseConfig {
            user: self.base.user.clone(),
            password: self.base.password.clone(),
            account: self.base.account.clone(),
            warehouse: self.base.warehouse.clone(),
            role: self.base.role.clone(),
            database: entry.database.clone(),
            schema: entry.schema.clone(),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

/// `DB.SCHEMA` → `SCHEMA`
fn last_segment(schema: &str) -> String {
    schema
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn parse_extra_databases(declared: &str, default_schema: &str) -> AppResult<Vec<DatabaseEntry>> {
    let mut entries = Vec::new();
    for item in declared.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, target) = item.split_once('=').ok_or_else(|| {
            AppError::Config(format!("invalid WAREHOUSE_DATABASES entry '{}'", item))
        })?;
        let key = key.trim();
        let (database, schema) = match target.split_once(':') {
            Some((db, schema)) => (db.trim(), last_segment(schema)),
            None => (target.trim(), default_schema.to_string()),
        };
        if key.is_empty() || database.is_empty() {
            return Err(AppError::Config(format!(
                "invalid WAREHOUSE_DATABASES entry '{}'",
                item
            )));
        }
        entries.push(DatabaseEntry {
            key: key.to_string(),
            database: database.to_string(),
            schema,
        });
    }
    Ok(entries)
}

/// Load `.env` from the working directory (best-effort, no error if missing).
///
/// Variables already present in the environment are left untouched.
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    let Ok(content) = std::fs::read_to_string(env_path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn warehouse_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("WAREHOUSE_USER", "analyst"),
            ("WAREHOUSE_PASSWORD", "secret"),
            ("WAREHOUSE_ACCOUNT", "warehouse.internal:5439"),
            ("WAREHOUSE_NAME", "COMPUTE_WH"),
            ("WAREHOUSE_ROLE", "READER"),
            ("WAREHOUSE_DATABASE", "LLM_EVAL"),
            ("WAREHOUSE_SCHEMA", "LLM_EVAL.PUBLIC"),
        ]
    }

    #[test]
    fn test_resolve_default_merges_base_credentials() {
        let registry = DatabaseRegistry::from_lookup(lookup(&warehouse_env())).unwrap();
        let config = registry.resolve(DEFAULT_DATABASE_KEY).unwrap();

        assert_eq!(config.user, "analyst");
        assert_eq!(config.password, "secret");
        assert_eq!(config.account, "warehouse.internal:5439");
        assert_eq!(config.warehouse, "COMPUTE_WH");
        assert_eq!(config.role, "READER");
        assert_eq!(config.database, "LLM_EVAL");
        assert_eq!(config.schema, "PUBLIC");
    }

    #[test]
    fn test_resolve_unknown_key_fails() {
        let registry = DatabaseRegistry::from_lookup(lookup(&warehouse_env())).unwrap();
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, AppError::UnknownDatabaseKey(ref k) if k == "missing"));
    }

    #[test]
    fn test_resolve_with_empty_environment_uses_blank_fallbacks() {
        let registry = DatabaseRegistry::from_lookup(lookup(&[])).unwrap();
        let config = registry.resolve(DEFAULT_DATABASE_KEY).unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }

    #[test]
    fn test_extra_databases_are_registered_in_order() {
        let mut env = warehouse_env();
        env.push(("WAREHOUSE_DATABASES", "sales=SALES_DB:REPORTING, ops = OPS_DB"));
        let registry = DatabaseRegistry::from_lookup(lookup(&env)).unwrap();

        assert_eq!(registry.available_keys(), vec!["default", "sales", "ops"]);

        let sales = registry.resolve("sales").unwrap();
        assert_eq!(sales.database, "SALES_DB");
        assert_eq!(sales.schema, "REPORTING");
        assert_eq!(sales.user, "analyst");

        let ops = registry.resolve("ops").unwrap();
        assert_eq!(ops.database, "OPS_DB");
        assert_eq!(ops.schema, "PUBLIC");
    }

    #[test]
    fn test_malformed_extra_databases_are_rejected() {
        for bad in ["sales", "=SALES_DB", "sales=", "default=OTHER"] {
            let mut env = warehouse_env();
            env.push(("WAREHOUSE_DATABASES", bad));
            let result = DatabaseRegistry::from_lookup(lookup(&env));
            assert!(matches!(result, Err(AppError::Config(_))), "accepted '{}'", bad);
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let registry = DatabaseRegistry::from_lookup(lookup(&warehouse_env())).unwrap();
        let config = registry.resolve(DEFAULT_DATABASE_KEY).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_app_config_defaults_and_overrides() {
        let config = AppConfig::from_lookup("svc", lookup(&[]));
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_page_limit, 1000);
        assert_eq!(config.log_format, LogFormat::Pretty);

        let config = AppConfig::from_lookup(
            "svc",
            lookup(&[
                ("SERVER_PORT", "8088"),
                ("LOG_FORMAT", "JSON"),
                ("DB_MAX_CONNECTIONS", "not-a-number"),
                ("MAX_PAGE_LIMIT", "0"),
                ("CACHE_TTL_SECS", "30"),
            ]),
        );
        assert_eq!(config.service_name, "svc");
        assert_eq!(config.port, 8088);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.max_page_limit, 1000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
    }
}
