//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL side of the unit-of-work kernel, built
//! on SQLx:
//! - `pool`: connection pool configuration and creation
//! - `connection`: the pooled connection source and the connection with
//!   emulated auto-commit that units of work hold
//! - `error_classes`: failure classifiers keyed on PostgreSQL SQLSTATE codes
//! - `config`: environment-driven configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{connect, error_classes, PersistConfig};
//! use persist_kernel::{PolicyRegistry, TransactionPolicy};
//!
//! let policies = PolicyRegistry::builder()
//!     .enclosing_type::<LedgerService>(
//!         TransactionPolicy::new().rollback_on(error_classes::sqlx_error()),
//!     )
//!     .build();
//!
//! let module = connect(&PersistConfig::from_env()?, policies).await?;
//! let interceptor = module.interceptor();
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod error_classes;
pub mod pool;

pub use config::PersistConfig;
pub use connection::{PgConnectionSource, PooledPgConnection};
pub use error::DatabaseError;
pub use pool::{create_pool, DatabaseConfig, DatabasePool};

use persist_kernel::{PersistModule, PolicyRegistry};
use tracing::info;

/// Creates the pool and wires a started persistence module over it
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the pool cannot be created
pub async fn connect(
    config: &PersistConfig,
    policies: PolicyRegistry,
) -> Result<PersistModule<PgConnectionSource>, DatabaseError> {
    let pool = create_pool(&config.database).await?;
    let module = PersistModule::builder(PgConnectionSource::new(pool))
        .query_config(config.query.clone())
        .policies(policies)
        .build();
    module.start();
    info!(dialect = ?config.query.dialect, "Persistence module ready");
    Ok(module)
}
