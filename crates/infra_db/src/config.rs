//! Persistence configuration
//!
//! Everything needed to build a PostgreSQL-backed persistence module: pool
//! settings, the SQL dialect and the session settings applied to each unit
//! of work.

use persist_kernel::{QueryConfig, QuerySettings, SqlDialect};
use serde::Deserialize;
use std::time::Duration;

use crate::error::DatabaseError;
use crate::pool::DatabaseConfig;

/// Configuration of a PostgreSQL-backed persistence module
#[derive(Debug, Clone, Default)]
pub struct PersistConfig {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
}

/// Flat shape of the environment variables
///
/// * `PERSIST_DATABASE_URL` - PostgreSQL connection string
/// * `PERSIST_MAX_CONNECTIONS` / `PERSIST_MIN_CONNECTIONS` - pool bounds
/// * `PERSIST_CONNECT_TIMEOUT_SECS` - acquisition timeout
/// * `PERSIST_MAX_LIFETIME_SECS` / `PERSIST_IDLE_TIMEOUT_SECS` - connection recycling
/// * `PERSIST_DIALECT` - postgres, mysql, sqlite or standard
/// * `PERSIST_SEARCH_PATH` - comma separated schemas
/// * `PERSIST_STATEMENT_TIMEOUT_MS` - per-statement timeout
#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    database_url: Option<String>,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    connect_timeout_secs: Option<u64>,
    max_lifetime_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    dialect: Option<SqlDialect>,
    search_path: Option<String>,
    statement_timeout_ms: Option<u64>,
}

impl PersistConfig {
    pub fn new(database: DatabaseConfig, query: QueryConfig) -> Self {
        Self { database, query }
    }

    /// Loads configuration from `PERSIST_*` environment variables
    ///
    /// A `.env` file is read first if present. Unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self, DatabaseError> {
        dotenvy::dotenv().ok();
        Self::from_env_prefix("PERSIST")
    }

    /// Loads configuration from environment variables with a custom prefix
    pub fn from_env_prefix(prefix: &str) -> Result<Self, DatabaseError> {
        let settings: EnvSettings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings.into())
    }
}

impl From<EnvSettings> for PersistConfig {
    fn from(env: EnvSettings) -> Self {
        let mut database = match env.database_url {
            Some(url) => DatabaseConfig::new(url),
            None => DatabaseConfig::default(),
        };
        if let Some(max) = env.max_connections {
            database = database.max_connections(max);
        }
        if let Some(min) = env.min_connections {
            database = database.min_connections(min);
        }
        if let Some(secs) = env.connect_timeout_secs {
            database = database.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env.max_lifetime_secs {
            database = database.max_lifetime(Duration::from_secs(secs));
        }
        if let Some(secs) = env.idle_timeout_secs {
            database = database.idle_timeout(Duration::from_secs(secs));
        }

        let mut settings = QuerySettings::default();
        if let Some(path) = env.search_path {
            settings = settings.search_path(
                path.split(',')
                    .map(str::trim)
                    .filter(|schema| !schema.is_empty()),
            );
        }
        if let Some(ms) = env.statement_timeout_ms {
            settings = settings.statement_timeout(Duration::from_millis(ms));
        }

        let mut query = QueryConfig::new(env.dialect.unwrap_or_default());
        if !settings.is_empty() {
            query = query.with_settings(settings);
        }

        Self { database, query }
    }
}
