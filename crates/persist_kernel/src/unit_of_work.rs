//! Units of work and the execution contexts they are bound to
//!
//! An execution context is a [`WorkContext`] value: one per thread, task or
//! request, passed by `&mut` down the call chain instead of living in
//! thread-local storage. At most one [`UnitOfWork`] is bound to a context at
//! a time. [`UnitOfWorkManager`] creates and tears down those bindings.
//!
//! # Example
//!
//! ```rust,ignore
//! let units = UnitOfWorkManager::new(source, QueryConfig::new(SqlDialect::Postgres));
//! let mut ctx = WorkContext::new();
//!
//! units.begin(&mut ctx).await?;
//! let mut scope = ctx.query()?;
//! run_report(scope.connection()).await?;
//! units.end(&mut ctx).await?;
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::{ConnectionError, PersistError};
use crate::guard::ConnectionGuard;
use crate::identifiers::ContextId;
use crate::ports::{Connection, ConnectionSource};
use crate::query::{QueryConfig, QueryContext};

/// The binding of a connection and query context to one execution context
#[derive(Debug)]
pub struct UnitOfWork<C: Connection> {
    guard: ConnectionGuard<C>,
    query: QueryContext,
    begun_at: DateTime<Utc>,
}

impl<C: Connection> UnitOfWork<C> {
    pub fn guard(&self) -> &ConnectionGuard<C> {
        &self.guard
    }

    pub fn query_context(&self) -> &QueryContext {
        &self.query
    }

    pub fn begun_at(&self) -> DateTime<Utc> {
        self.begun_at
    }
}

/// State of one execution context
#[derive(Debug)]
pub struct WorkContext<C: Connection> {
    id: ContextId,
    unit: Option<UnitOfWork<C>>,
}

impl<C: Connection> WorkContext<C> {
    /// Creates an idle context
    pub fn new() -> Self {
        Self {
            id: ContextId::new(),
            unit: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns true while a unit of work is bound
    pub fn is_active(&self) -> bool {
        self.unit.is_some()
    }

    pub fn unit(&self) -> Option<&UnitOfWork<C>> {
        self.unit.as_ref()
    }

    /// The guard of the bound unit of work
    pub fn connection_guard(&self) -> Option<&ConnectionGuard<C>> {
        self.unit.as_ref().map(|unit| &unit.guard)
    }

    pub fn connection_guard_mut(&mut self) -> Option<&mut ConnectionGuard<C>> {
        self.unit.as_mut().map(|unit| &mut unit.guard)
    }

    /// The query context and connection of the bound unit of work
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::OutsideWorkUnit`] if no unit of work is bound.
    pub fn query(&mut self) -> Result<QueryScope<'_, C>, PersistError> {
        let unit = self.unit.as_mut().ok_or(PersistError::OutsideWorkUnit)?;
        let connection = unit.guard.connection_mut()?;
        Ok(QueryScope {
            context: &unit.query,
            connection,
        })
    }
}

impl<C: Connection> Default for WorkContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of the active query context and its connection
pub struct QueryScope<'a, C> {
    context: &'a QueryContext,
    connection: &'a mut C,
}

impl<'a, C> QueryScope<'a, C> {
    pub fn context(&self) -> &QueryContext {
        self.context
    }

    pub fn connection(&mut self) -> &mut C {
        self.connection
    }
}

/// Creates and tears down units of work for execution contexts
///
/// The manager is shared between contexts; all per-context state lives in
/// the [`WorkContext`] passed to each call.
pub struct UnitOfWorkManager<S: ConnectionSource> {
    source: S,
    query: QueryConfig,
}

impl<S: ConnectionSource> UnitOfWorkManager<S> {
    pub fn new(source: S, query: QueryConfig) -> Self {
        Self { source, query }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    /// Returns true if `ctx` has a bound unit of work
    pub fn is_working(&self, ctx: &WorkContext<S::Connection>) -> bool {
        ctx.is_active()
    }

    /// Acquires a connection and binds a new unit of work to `ctx`
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::AlreadyActive`] if `ctx` already has a unit of
    /// work, or a connection error if acquisition or session setup fails. In
    /// both cases nothing new is bound.
    #[instrument(skip_all, fields(context = %ctx.id()))]
    pub async fn begin(&self, ctx: &mut WorkContext<S::Connection>) -> Result<(), PersistError> {
        if ctx.is_active() {
            return Err(PersistError::AlreadyActive { context: ctx.id() });
        }

        let mut guard = ConnectionGuard::acquire(&self.source).await?;
        let query = self.query.resolve();

        let configured = match guard.connection_mut() {
            Ok(connection) => connection.configure(&query).await,
            Err(error) => Err(error),
        };
        if let Err(error) = configured {
            if let Err(release_error) = guard.close().await {
                warn!(error = %release_error, "Failed to release connection after setup failure");
            }
            return Err(error.into());
        }

        ctx.unit = Some(UnitOfWork {
            guard,
            query,
            begun_at: Utc::now(),
        });
        debug!("Unit of work begun");
        Ok(())
    }

    /// Begins a unit of work unless one is already bound
    ///
    /// Returns whether a new unit of work was begun.
    pub async fn begin_if_idle(
        &self,
        ctx: &mut WorkContext<S::Connection>,
    ) -> Result<bool, PersistError> {
        if ctx.is_active() {
            return Ok(false);
        }
        self.begin(ctx).await?;
        Ok(true)
    }

    /// Unbinds the unit of work of `ctx` and releases its connection
    ///
    /// Calling this on an idle context does nothing. The context is idle
    /// afterwards even if releasing the connection fails.
    #[instrument(skip_all, fields(context = %ctx.id()))]
    pub async fn end(&self, ctx: &mut WorkContext<S::Connection>) -> Result<(), ConnectionError> {
        let Some(mut unit) = ctx.unit.take() else {
            return Ok(());
        };

        let duration = Utc::now() - unit.begun_at;
        let closed = unit.guard.close().await;
        debug!(duration_ms = duration.num_milliseconds(), "Unit of work ended");
        closed
    }

    /// Reserved for pool setup
    pub fn start(&self) {
        debug!("Persistence service started");
    }

    /// Reserved for pool teardown
    pub fn stop(&self) {
        debug!("Persistence service stopped");
    }
}
