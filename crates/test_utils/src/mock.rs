//! In-Memory Connection Source
//!
//! A [`MockConnectionSource`] hands out connections that record every
//! operation into a shared journal instead of talking to a database. Tests
//! inspect the journal to verify the exact transaction protocol, and can
//! inject one-shot failures into any operation.

use async_trait::async_trait;
use persist_kernel::{Connection, ConnectionError, ConnectionId, ConnectionSource, QueryContext};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded connection operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Acquired,
    AutoCommit(bool),
    Commit,
    Rollback,
    Configured(QueryContext),
    Statement(String),
    Closed,
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Acquire,
    DisableAutoCommit,
    EnableAutoCommit,
    Commit,
    Rollback,
    Configure,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    journal: Vec<ConnectionEvent>,
    failures: HashSet<MockOperation>,
    acquired: usize,
    closed: usize,
}

impl MockState {
    fn take_failure(&mut self, operation: MockOperation) -> bool {
        self.failures.remove(&operation)
    }
}

/// Connection source recording into a shared journal
///
/// Clones share the journal, so a test can keep one clone for inspection
/// while another is moved into a persistence module.
#[derive(Debug, Clone, Default)]
pub struct MockConnectionSource {
    state: Arc<Mutex<MockState>>,
}

impl MockConnectionSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next call of `operation` fail
    pub fn fail_next(&self, operation: MockOperation) {
        self.state().failures.insert(operation);
    }

    /// Every event recorded so far, across all connections
    pub fn journal(&self) -> Vec<ConnectionEvent> {
        self.state().journal.clone()
    }

    pub fn commits(&self) -> usize {
        self.count(|event| matches!(event, ConnectionEvent::Commit))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|event| matches!(event, ConnectionEvent::Rollback))
    }

    pub fn acquired(&self) -> usize {
        self.state().acquired
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// Connections handed out and not yet closed
    pub fn open_connections(&self) -> usize {
        let state = self.state();
        state.acquired - state.closed
    }

    /// Forgets recorded events and pending failures
    pub fn clear(&self) {
        let mut state = self.state();
        state.journal.clear();
        state.failures.clear();
    }

    fn count(&self, predicate: impl Fn(&ConnectionEvent) -> bool) -> usize {
        self.state().journal.iter().filter(|event| predicate(event)).count()
    }
}

#[async_trait]
impl ConnectionSource for MockConnectionSource {
    type Connection = MockConnection;

    async fn acquire(&self) -> Result<MockConnection, ConnectionError> {
        let mut state = self.state();
        if state.take_failure(MockOperation::Acquire) {
            return Err(ConnectionError::acquire("mock pool exhausted"));
        }
        state.acquired += 1;
        state.journal.push(ConnectionEvent::Acquired);
        drop(state);

        Ok(MockConnection {
            id: ConnectionId::new(),
            auto_commit: true,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection that records instead of executing
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    auto_commit: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `sql` as executed
    pub fn execute(&mut self, sql: impl Into<String>) {
        self.state().journal.push(ConnectionEvent::Statement(sql.into()));
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        let operation = if enabled {
            MockOperation::EnableAutoCommit
        } else {
            MockOperation::DisableAutoCommit
        };
        let mut state = self.state();
        if state.take_failure(operation) {
            return Err(ConnectionError::auto_commit(enabled, "mock auto-commit failure"));
        }
        state.journal.push(ConnectionEvent::AutoCommit(enabled));
        drop(state);
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ConnectionError> {
        if self.auto_commit {
            return Err(ConnectionError::commit("cannot commit while auto-commit is enabled"));
        }
        let mut state = self.state();
        if state.take_failure(MockOperation::Commit) {
            return Err(ConnectionError::commit("mock commit failure"));
        }
        state.journal.push(ConnectionEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ConnectionError> {
        if self.auto_commit {
            return Err(ConnectionError::rollback("cannot roll back while auto-commit is enabled"));
        }
        let mut state = self.state();
        if state.take_failure(MockOperation::Rollback) {
            return Err(ConnectionError::rollback("mock rollback failure"));
        }
        state.journal.push(ConnectionEvent::Rollback);
        Ok(())
    }

    async fn configure(&mut self, context: &QueryContext) -> Result<(), ConnectionError> {
        let mut state = self.state();
        if state.take_failure(MockOperation::Configure) {
            return Err(ConnectionError::configure("mock configure failure"));
        }
        state.journal.push(ConnectionEvent::Configured(context.clone()));
        Ok(())
    }

    async fn close(self) -> Result<(), ConnectionError> {
        let mut state = self.state();
        // The connection is gone either way
        state.closed += 1;
        if state.take_failure(MockOperation::Close) {
            return Err(ConnectionError::release("mock close failure"));
        }
        state.journal.push(ConnectionEvent::Closed);
        Ok(())
    }
}
