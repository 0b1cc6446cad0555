//! Connection guard
//!
//! A [`ConnectionGuard`] owns the single connection of a unit of work from
//! acquisition until release. The interceptor drives the transaction
//! protocol through it and never touches the connection directly.

use tracing::{debug, warn};

use crate::error::ConnectionError;
use crate::identifiers::ConnectionId;
use crate::ports::{Connection, ConnectionSource};

/// Exclusive owner of one acquired connection
///
/// Once released, every operation fails with [`ConnectionError::Released`]
/// and further calls to [`close`](Self::close) do nothing.
#[derive(Debug)]
pub struct ConnectionGuard<C: Connection> {
    connection: Option<C>,
    id: ConnectionId,
}

impl<C: Connection> ConnectionGuard<C> {
    /// Wraps an already acquired connection
    pub fn new(connection: C) -> Self {
        Self {
            id: connection.id(),
            connection: Some(connection),
        }
    }

    /// Acquires a connection from `source`
    pub async fn acquire<S>(source: &S) -> Result<Self, ConnectionError>
    where
        S: ConnectionSource<Connection = C>,
    {
        debug!("Getting connection");
        let connection = source.acquire().await?;
        debug!(connection = %connection.id(), "Connection acquired");
        Ok(Self::new(connection))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns false once the connection has been given back
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns the current auto-commit mode of the connection
    ///
    /// A released guard reports `true`: nothing can be pending on it.
    pub fn is_auto_commit(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(true, C::is_auto_commit)
    }

    pub async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        if enabled {
            debug!(connection = %self.id, "Enabling auto commit");
        } else {
            debug!(connection = %self.id, "Disabling auto commit");
        }
        self.connection_mut()?.set_auto_commit(enabled).await
    }

    pub async fn commit(&mut self) -> Result<(), ConnectionError> {
        debug!(connection = %self.id, "Committing transaction");
        self.connection_mut()?.commit().await
    }

    pub async fn rollback(&mut self) -> Result<(), ConnectionError> {
        debug!(connection = %self.id, "Rolling back transaction");
        self.connection_mut()?.rollback().await
    }

    /// Borrows the connection for running queries
    pub fn connection_mut(&mut self) -> Result<&mut C, ConnectionError> {
        self.connection.as_mut().ok_or(ConnectionError::Released)
    }

    pub fn connection(&self) -> Result<&C, ConnectionError> {
        self.connection.as_ref().ok_or(ConnectionError::Released)
    }

    /// Releases the connection
    ///
    /// A boundary still open at this point is rolled back first, so the
    /// connection never goes back to its source mid-transaction. If that
    /// rollback fails the connection is still released and the rollback
    /// failure is returned.
    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        let mut pending = None;
        if !connection.is_auto_commit() {
            warn!(connection = %self.id, "Releasing connection with an open transaction; rolling back");
            if let Err(error) = connection.rollback().await {
                pending = Some(error);
            }
        }

        debug!(connection = %self.id, "Closing connection");
        let closed = connection.close().await;
        match pending {
            Some(error) => {
                if let Err(close_error) = closed {
                    warn!(connection = %self.id, error = %close_error, "Release failed after rollback failure");
                }
                Err(error)
            }
            None => closed,
        }
    }
}
