//! Ports to the connection layer
//!
//! The kernel never talks to a database driver directly. It consumes a
//! [`ConnectionSource`] that hands out [`Connection`]s, and everything it
//! does to a connection goes through the handful of operations below.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │    TransactionInterceptor    │
//! └──────────────────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │  UnitOfWorkManager / Guard   │
//! └──────────────────────────────┘
//!                │  Connection / ConnectionSource
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────┐  ┌─────────────┐
//! │  infra_db   │  │  test_utils │
//! │ (Postgres)  │  │   (mock)    │
//! └─────────────┘  └─────────────┘
//! ```
//!
//! # Auto-commit
//!
//! Connections follow JDBC semantics: with auto-commit on, every statement
//! commits on its own. Turning it off opens a transaction boundary that lasts
//! until `commit` or `rollback`; while it stays off, the next statement opens
//! a new transaction. Turning it back on commits whatever is still open.

use async_trait::async_trait;

use crate::error::ConnectionError;
use crate::identifiers::ConnectionId;
use crate::query::QueryContext;

/// One physical connection
#[async_trait]
pub trait Connection: Send + 'static {
    /// Identifier used in log output
    fn id(&self) -> ConnectionId;

    /// Returns the current auto-commit mode
    fn is_auto_commit(&self) -> bool;

    /// Switches auto-commit mode
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ConnectionError>;

    /// Commits the open transaction
    async fn commit(&mut self) -> Result<(), ConnectionError>;

    /// Rolls back the open transaction
    async fn rollback(&mut self) -> Result<(), ConnectionError>;

    /// Applies the session settings of a new unit of work
    async fn configure(&mut self, context: &QueryContext) -> Result<(), ConnectionError> {
        let _ = context;
        Ok(())
    }

    /// Gives the connection back to wherever it came from
    async fn close(self) -> Result<(), ConnectionError>
    where
        Self: Sized;
}

/// Hands out connections, typically from a pool
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: Connection;

    /// Obtains a connection with auto-commit enabled
    async fn acquire(&self) -> Result<Self::Connection, ConnectionError>;
}
