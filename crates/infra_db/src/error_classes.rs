//! Failure classifiers for PostgreSQL errors
//!
//! Each classifier looks for a [`sqlx::Error`] anywhere in a failure's source
//! chain, so application errors wrapping a database error with `#[from]` or
//! `#[source]` are classified by what the database reported.

use std::error::Error;

use persist_kernel::ErrorClass;

use crate::error::{sqlstate, DatabaseError};

fn sqlstate_is(error: &(dyn Error + 'static), code: &str) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(sqlx::Error::as_database_error)
        .and_then(|db_err| db_err.code())
        .is_some_and(|found| found == code)
}

/// Statement cancelled by `statement_timeout` (SQLSTATE 57014)
pub fn statement_timeout() -> ErrorClass {
    ErrorClass::matching("postgres.statement_timeout", |error| {
        sqlstate_is(error, sqlstate::QUERY_CANCELED)
    })
}

/// Serialization failure under repeatable read or serializable (SQLSTATE 40001)
pub fn serialization_failure() -> ErrorClass {
    ErrorClass::matching("postgres.serialization_failure", |error| {
        sqlstate_is(error, sqlstate::SERIALIZATION_FAILURE)
    })
}

/// Deadlock detected (SQLSTATE 40P01)
pub fn deadlock_detected() -> ErrorClass {
    ErrorClass::matching("postgres.deadlock_detected", |error| {
        sqlstate_is(error, sqlstate::DEADLOCK_DETECTED)
    })
}

/// Unique constraint violation (SQLSTATE 23505)
pub fn unique_violation() -> ErrorClass {
    ErrorClass::matching("postgres.unique_violation", |error| {
        sqlstate_is(error, sqlstate::UNIQUE_VIOLATION)
    })
}

/// No pooled connection became available in time
pub fn pool_timed_out() -> ErrorClass {
    ErrorClass::matching("postgres.pool_timed_out", |error| {
        matches!(error.downcast_ref::<sqlx::Error>(), Some(sqlx::Error::PoolTimedOut))
    })
}

/// Any failure worth retrying the whole transaction for
///
/// Covers statement timeouts, serialization failures, deadlocks and pool
/// timeouts.
pub fn transient() -> ErrorClass {
    ErrorClass::matching("postgres.transient", |error| {
        error
            .downcast_ref::<sqlx::Error>()
            .is_some_and(|sqlx_err| DatabaseError::from(sqlx_err).is_transient())
    })
}

/// Any SQLx error
pub fn sqlx_error() -> ErrorClass {
    ErrorClass::of::<sqlx::Error>()
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use sqlx::error::{DatabaseError as SqlxDatabaseError, ErrorKind};

    use super::*;

    /// Server error carrying only a SQLSTATE
    #[derive(Debug, thiserror::Error)]
    #[error("server reported {code}")]
    struct ServerError {
        code: &'static str,
    }

    impl SqlxDatabaseError for ServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn server_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ServerError { code }))
    }

    #[derive(Debug, thiserror::Error)]
    enum ServiceError {
        #[error("storage failure")]
        Storage(#[from] sqlx::Error),
        #[error("not allowed")]
        Forbidden,
    }

    #[test]
    fn test_pool_timeout_found_through_chain() {
        let failure = ServiceError::from(sqlx::Error::PoolTimedOut);

        assert!(pool_timed_out().matches(&failure));
        assert!(sqlx_error().matches(&failure));
        assert!(!statement_timeout().matches(&failure));
    }

    #[test]
    fn test_application_errors_do_not_match() {
        let failure = ServiceError::Forbidden;

        assert!(!sqlx_error().matches(&failure));
        assert!(!unique_violation().matches(&failure));
        assert!(!pool_timed_out().matches(&failure));
    }

    #[test]
    fn test_conflicts_are_told_apart_by_sqlstate() {
        let serialization = ServiceError::from(server_error(sqlstate::SERIALIZATION_FAILURE));
        let deadlock = ServiceError::from(server_error(sqlstate::DEADLOCK_DETECTED));

        assert!(serialization_failure().matches(&serialization));
        assert!(!deadlock_detected().matches(&serialization));
        assert!(deadlock_detected().matches(&deadlock));
        assert!(!serialization_failure().matches(&deadlock));
        assert!(transient().matches(&serialization));
        assert!(transient().matches(&deadlock));
    }

    #[test]
    fn test_constraint_violations_are_not_transient() {
        let failure = ServiceError::from(server_error(sqlstate::UNIQUE_VIOLATION));

        assert!(unique_violation().matches(&failure));
        assert!(!transient().matches(&failure));
    }
}
