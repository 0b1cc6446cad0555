//! Database error types
//!
//! This module defines the errors raised while setting up the PostgreSQL
//! connection source and the mapping from SQLx errors to them, keyed on the
//! PostgreSQL SQLSTATE where one is available.

use thiserror::Error;

/// SQLSTATE codes the adapter distinguishes
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const QUERY_CANCELED: &str = "57014";
}

/// Errors that can occur while talking to PostgreSQL
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Statement cancelled, usually by `statement_timeout`
    #[error("Statement timed out: {0}")]
    StatementTimeout(String),

    /// Serialization failure or deadlock; the transaction may be retried
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Checks if retrying the whole transaction may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::PoolExhausted
                | DatabaseError::StatementTimeout(_)
                | DatabaseError::TransactionConflict(_)
        )
    }
}

impl From<config::ConfigError> for DatabaseError {
    fn from(error: config::ConfigError) -> Self {
        DatabaseError::Configuration(error.to_string())
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed("connection pool is closed".to_string())
            }
            sqlx::Error::Io(io) => DatabaseError::ConnectionFailed(io.to_string()),
            sqlx::Error::Tls(tls) => DatabaseError::ConnectionFailed(tls.to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some(sqlstate::QUERY_CANCELED) => DatabaseError::StatementTimeout(message),
                    Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                        DatabaseError::TransactionConflict(message)
                    }
                    Some(sqlstate::UNIQUE_VIOLATION) => DatabaseError::DuplicateEntry(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}
