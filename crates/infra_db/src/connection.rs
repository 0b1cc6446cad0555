//! PostgreSQL connection source
//!
//! PostgreSQL has no connection-level auto-commit switch: every statement
//! outside `BEGIN`/`COMMIT` commits on its own. [`PooledPgConnection`]
//! emulates the switch. With auto-commit off, the first call to
//! [`executor`](PooledPgConnection::executor) opens a transaction, which
//! stays open until `commit` or `rollback`; the next `executor` call then
//! opens another. Turning auto-commit back on commits anything still open.

use async_trait::async_trait;
use persist_kernel::{Connection, ConnectionError, ConnectionId, ConnectionSource, QueryContext};
use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::{debug, warn};

use crate::error::DatabaseError;

/// Hands out pooled PostgreSQL connections to units of work
#[derive(Debug, Clone)]
pub struct PgConnectionSource {
    pool: PgPool,
}

impl PgConnectionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PgConnectionSource {
    type Connection = PooledPgConnection;

    async fn acquire(&self) -> Result<PooledPgConnection, ConnectionError> {
        let connection = self.pool.acquire().await.map_err(|e| {
            ConnectionError::acquire(DatabaseError::from(&e).to_string()).with_source(e)
        })?;
        Ok(PooledPgConnection::new(connection))
    }
}

/// One pooled connection with emulated auto-commit
#[derive(Debug)]
pub struct PooledPgConnection {
    id: ConnectionId,
    inner: PoolConnection<Postgres>,
    auto_commit: bool,
    in_transaction: bool,
    session_configured: bool,
}

impl PooledPgConnection {
    fn new(inner: PoolConnection<Postgres>) -> Self {
        Self {
            id: ConnectionId::new(),
            inner,
            auto_commit: true,
            in_transaction: false,
            session_configured: false,
        }
    }

    /// Returns the connection to run statements on
    ///
    /// Opens a transaction first when auto-commit is off and none is open.
    pub async fn executor(&mut self) -> Result<&mut PgConnection, ConnectionError> {
        if !self.auto_commit && !self.in_transaction {
            self.run("BEGIN")
                .await
                .map_err(|e| ConnectionError::auto_commit(false, "failed to open transaction").with_source(e))?;
            self.in_transaction = true;
        }
        Ok(&mut *self.inner)
    }

    /// Returns true while a `BEGIN` is outstanding
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn run(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        let conn: &mut PgConnection = &mut self.inner;
        conn.execute(sql).await?;
        Ok(())
    }

    /// Ends the open transaction with `statement`, if there is one
    ///
    /// PostgreSQL ends the transaction even when `COMMIT` or `ROLLBACK`
    /// reports an error, so it is no longer tracked as open either way.
    async fn finish(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.run(statement).await
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[async_trait]
impl Connection for PooledPgConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        if enabled && !self.auto_commit {
            self.finish("COMMIT").await.map_err(|e| {
                ConnectionError::auto_commit(true, "failed to commit open transaction").with_source(e)
            })?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ConnectionError> {
        if self.auto_commit {
            return Err(ConnectionError::commit("cannot commit while auto-commit is enabled"));
        }
        self.finish("COMMIT")
            .await
            .map_err(|e| ConnectionError::commit(DatabaseError::from(&e).to_string()).with_source(e))
    }

    async fn rollback(&mut self) -> Result<(), ConnectionError> {
        if self.auto_commit {
            return Err(ConnectionError::rollback("cannot roll back while auto-commit is enabled"));
        }
        self.finish("ROLLBACK")
            .await
            .map_err(|e| ConnectionError::rollback(DatabaseError::from(&e).to_string()).with_source(e))
    }

    async fn configure(&mut self, context: &QueryContext) -> Result<(), ConnectionError> {
        let settings = context.settings();
        if !settings.search_path.is_empty() {
            let path = settings
                .search_path
                .iter()
                .map(|schema| quote_ident(schema))
                .collect::<Vec<_>>()
                .join(", ");
            debug!(search_path = %path, "Setting search path");
            self.session_configured = true;
            self.run(&format!("SET search_path TO {}", path))
                .await
                .map_err(|e| ConnectionError::configure("failed to set search_path").with_source(e))?;
        }
        if let Some(timeout) = settings.statement_timeout {
            debug!(timeout_ms = timeout.as_millis() as u64, "Setting statement timeout");
            self.session_configured = true;
            self.run(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .await
                .map_err(|e| ConnectionError::configure("failed to set statement_timeout").with_source(e))?;
        }
        Ok(())
    }

    async fn close(mut self) -> Result<(), ConnectionError> {
        let mut cleanup = self.finish("ROLLBACK").await;
        if cleanup.is_ok() && self.session_configured {
            cleanup = self.run("RESET ALL").await;
        }

        match cleanup {
            Ok(()) => {
                // Dropping the pool connection hands it back to the pool
                drop(self.inner);
                Ok(())
            }
            Err(e) => {
                warn!(connection = %self.id, "Discarding connection that could not be reset");
                if let Err(close_error) = self.inner.close().await {
                    warn!(connection = %self.id, error = %close_error, "Failed to close discarded connection");
                }
                Err(ConnectionError::release("failed to reset session").with_source(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("ledger"), "\"ledger\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
