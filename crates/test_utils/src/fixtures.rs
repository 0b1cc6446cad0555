//! Pre-built Test Fixtures
//!
//! Error types, call sites, policies and a wired persistence module over the
//! mock connection source. These fixtures are designed to be consistent and
//! predictable across the test suites.

use persist_kernel::{
    CallSite, ErrorClass, PersistError, PersistModule, PolicyRegistry, QueryConfig,
    TransactionPolicy,
};
use thiserror::Error;

use crate::mock::MockConnectionSource;

/// A statement ran out of time
#[derive(Debug, Error)]
#[error("statement timed out after {elapsed_ms}ms")]
pub struct SqlTimeoutError {
    pub elapsed_ms: u64,
}

impl SqlTimeoutError {
    pub fn new() -> Self {
        Self { elapsed_ms: 5_000 }
    }
}

impl Default for SqlTimeoutError {
    fn default() -> Self {
        Self::new()
    }
}

/// Input rejected by the service
#[derive(Debug, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Error type of the fixture service
///
/// Wrapped errors are exposed as sources so type classifiers see them.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("persistence failure")]
    Persist(#[from] PersistError),

    #[error("query timed out")]
    Timeout(#[from] SqlTimeoutError),

    #[error("invalid input")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn timeout() -> Self {
        SqlTimeoutError::new().into()
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ValidationError(message.into()).into()
    }

    /// The persistence failure, if this is one
    pub fn as_persist(&self) -> Option<&PersistError> {
        match self {
            AppError::Persist(error) => Some(error),
            _ => None,
        }
    }
}

/// Enclosing type of the fixture operations
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerService;

/// Enclosing type with no registered policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportService;

/// Call sites of the fixture service
pub struct CallSites;

impl CallSites {
    pub fn post_entry() -> CallSite {
        CallSite::of::<LedgerService>("post_entry")
    }

    pub fn reverse_entry() -> CallSite {
        CallSite::of::<LedgerService>("reverse_entry")
    }

    pub fn monthly_report() -> CallSite {
        CallSite::of::<ReportService>("monthly_report")
    }
}

/// Rolls back on timeouts only
pub fn timeout_policy() -> TransactionPolicy {
    TransactionPolicy::new().rollback_on(ErrorClass::of::<SqlTimeoutError>())
}

/// Rolls back on everything except validation failures
pub fn lenient_policy() -> TransactionPolicy {
    TransactionPolicy::new()
        .rollback_on(ErrorClass::any())
        .ignore(ErrorClass::of::<ValidationError>())
}

/// A module over a fresh mock source, returning a clone of the source
pub fn mock_module(policies: PolicyRegistry) -> (PersistModule<MockConnectionSource>, MockConnectionSource) {
    mock_module_with(policies, QueryConfig::default())
}

pub fn mock_module_with(
    policies: PolicyRegistry,
    query: QueryConfig,
) -> (PersistModule<MockConnectionSource>, MockConnectionSource) {
    let source = MockConnectionSource::new();
    let module = PersistModule::builder(source.clone())
        .query_config(query)
        .policies(policies)
        .build();
    (module, source)
}
