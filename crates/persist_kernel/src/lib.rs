//! Persist Kernel - unit-of-work lifecycle and declarative transactions
//!
//! This crate decides when a connection is acquired, when auto-commit is
//! suspended and resumed, when a unit of work begins and ends, and whether a
//! failing call commits or rolls back:
//! - `guard`: the connection owned by a unit of work
//! - `unit_of_work`: execution contexts and the manager binding units to them
//! - `policy`: rollback rules per call site and their cached resolution
//! - `interceptor`: the transaction protocol around an advised call
//! - `module`: wiring of the above over one connection source
//!
//! The database itself sits behind the `Connection` and `ConnectionSource`
//! ports; `infra_db` provides the PostgreSQL implementation.

pub mod error;
pub mod guard;
pub mod identifiers;
pub mod interceptor;
pub mod module;
pub mod policy;
pub mod ports;
pub mod query;
pub mod unit_of_work;

pub use error::{ConnectionError, PersistError};
pub use guard::ConnectionGuard;
pub use identifiers::{CallSite, ConnectionId, ContextId};
pub use interceptor::{Advised, AdvisedCall, TransactionInterceptor};
pub use module::{PersistModule, PersistModuleBuilder};
pub use policy::{ErrorClass, FailureAction, PolicyRegistry, PolicyRegistryBuilder, TransactionPolicy};
pub use ports::{Connection, ConnectionSource};
pub use query::{QueryConfig, QueryContext, QuerySettings, SqlDialect};
pub use unit_of_work::{QueryScope, UnitOfWork, UnitOfWorkManager, WorkContext};

pub use futures::future::BoxFuture;
