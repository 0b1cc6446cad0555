//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! persistence test suites.
//!
//! # Modules
//!
//! - `mock`: In-memory connection source recording the transaction protocol
//! - `fixtures`: Error types, call sites and policies for a sample service
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers over the recorded protocol
//! - `generators`: Property-based test data generators
//! - `logging`: Test-harness tracing subscriber

pub mod mock;
pub mod fixtures;
pub mod database;
pub mod assertions;
pub mod generators;
pub mod logging;

pub use mock::*;
pub use fixtures::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
pub use logging::init_tracing;
