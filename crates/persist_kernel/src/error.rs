//! Error types for the unit-of-work and transaction layer
//!
//! Two kinds of failure originate here: lifecycle misuse (a second `begin`
//! on a context that is already working, or asking for the query context
//! outside a unit of work) and resource failures reported by the underlying
//! connection. Application failures raised by advised calls never pass
//! through these types; they are re-thrown to the caller as they were.

use thiserror::Error;

use crate::identifiers::ContextId;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by the physical connection or its source
///
/// Every variant except `Released` carries a message and, where available,
/// the driver error that caused it.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No connection could be obtained from the source
    #[error("Failed to acquire connection: {message}")]
    Acquire {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Switching auto-commit mode failed
    #[error("Failed to set auto-commit to {enabled}: {message}")]
    AutoCommit {
        enabled: bool,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Commit failed
    #[error("Commit failed: {message}")]
    Commit {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Rollback failed
    #[error("Rollback failed: {message}")]
    Rollback {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Applying session settings after acquisition failed
    #[error("Failed to configure connection: {message}")]
    Configure {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Returning the connection to its source failed
    #[error("Failed to release connection: {message}")]
    Release {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The guard has already given its connection back
    #[error("Connection already released")]
    Released,
}

impl ConnectionError {
    pub fn acquire(message: impl Into<String>) -> Self {
        ConnectionError::Acquire {
            message: message.into(),
            source: None,
        }
    }

    pub fn auto_commit(enabled: bool, message: impl Into<String>) -> Self {
        ConnectionError::AutoCommit {
            enabled,
            message: message.into(),
            source: None,
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        ConnectionError::Commit {
            message: message.into(),
            source: None,
        }
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        ConnectionError::Rollback {
            message: message.into(),
            source: None,
        }
    }

    pub fn configure(message: impl Into<String>) -> Self {
        ConnectionError::Configure {
            message: message.into(),
            source: None,
        }
    }

    pub fn release(message: impl Into<String>) -> Self {
        ConnectionError::Release {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying driver error
    ///
    /// Has no effect on `Released`, which never has a cause.
    pub fn with_source(mut self, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        match &mut self {
            ConnectionError::Acquire { source, .. }
            | ConnectionError::AutoCommit { source, .. }
            | ConnectionError::Commit { source, .. }
            | ConnectionError::Rollback { source, .. }
            | ConnectionError::Configure { source, .. }
            | ConnectionError::Release { source, .. } => *source = Some(Box::new(error)),
            ConnectionError::Released => {}
        }
        self
    }

    /// Returns true if the failure happened while ending a transaction
    pub fn is_completion_failure(&self) -> bool {
        matches!(
            self,
            ConnectionError::Commit { .. } | ConnectionError::Rollback { .. }
        )
    }

    /// Returns true if no connection could be obtained
    pub fn is_acquire_failure(&self) -> bool {
        matches!(self, ConnectionError::Acquire { .. })
    }
}

/// Errors raised by the unit-of-work and transaction layer itself
#[derive(Debug, Error)]
pub enum PersistError {
    /// `begin` was called twice on one context without an `end` in between
    #[error(
        "Work already begun on {context}. Looks like begin() was called twice \
         without a balancing call to end() in between"
    )]
    AlreadyActive { context: ContextId },

    /// The query context was requested while no unit of work is bound
    #[error(
        "Requested query context outside work unit. Call begin() first, or run \
         the operation through the transaction interceptor"
    )]
    OutsideWorkUnit,

    /// The underlying connection failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl PersistError {
    /// Returns true for misuse of the begin/end pairing
    pub fn is_lifecycle_misuse(&self) -> bool {
        matches!(
            self,
            PersistError::AlreadyActive { .. } | PersistError::OutsideWorkUnit
        )
    }

    /// Returns true for failures of the underlying resource
    pub fn is_connection_error(&self) -> bool {
        matches!(self, PersistError::Connection(_))
    }

    /// Returns the connection failure, if this is one
    pub fn as_connection_error(&self) -> Option<&ConnectionError> {
        match self {
            PersistError::Connection(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_with_source_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let error = ConnectionError::commit("server went away").with_source(cause);

        assert!(error.is_completion_failure());
        assert!(error.source().is_some());
    }

    #[test]
    fn test_released_ignores_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "ignored");
        let error = ConnectionError::Released.with_source(cause);

        assert!(error.source().is_none());
    }

    #[test]
    fn test_connection_error_converts() {
        let error: PersistError = ConnectionError::acquire("pool timed out").into();

        assert!(error.is_connection_error());
        assert!(!error.is_lifecycle_misuse());
        assert!(error.as_connection_error().unwrap().is_acquire_failure());
    }
}
