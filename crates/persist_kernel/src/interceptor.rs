//! Declarative transaction demarcation around advised calls
//!
//! [`TransactionInterceptor`] wraps a unit of work and a transaction boundary
//! around an [`AdvisedCall`]:
//!
//! 1. If the context is idle, a unit of work is begun and this invocation
//!    becomes its owner.
//! 2. If a boundary is already open (auto-commit off), the call joins it and
//!    its outcome is passed through untouched.
//! 3. Otherwise auto-commit is disabled, the call runs, and its outcome
//!    decides the transaction: a value commits, a failure commits or rolls
//!    back according to the call site's [`TransactionPolicy`]. Auto-commit is
//!    re-enabled on both paths.
//! 4. The owning invocation ends the unit of work on every exit path.
//!
//! Failures from the advised call reach the caller unchanged. Failures from
//! the connection reach it as [`PersistError`], converted into the call's own
//! error type.
//!
//! # Example
//!
//! ```rust,ignore
//! let site = CallSite::of::<LedgerService>("post_entry");
//!
//! let entry_id = interceptor
//!     .invoke(&mut ctx, site, move |ctx| {
//!         Box::pin(async move {
//!             let mut scope = ctx.query()?;
//!             insert_entry(scope.connection(), &entry).await
//!         })
//!     })
//!     .await?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, instrument, warn};

use crate::error::PersistError;
use crate::identifiers::CallSite;
use crate::policy::{FailureAction, PolicyRegistry, TransactionPolicy};
use crate::ports::{Connection, ConnectionSource};
use crate::unit_of_work::{UnitOfWorkManager, WorkContext};

/// An operation the interceptor can run inside a transaction
///
/// This is the seam to whatever dispatches calls: it names the call site
/// for policy resolution and runs the wrapped operation on demand.
pub trait AdvisedCall<C: Connection>: Send {
    type Output: Send;
    type Error: std::error::Error + From<PersistError> + Send + 'static;

    fn call_site(&self) -> &CallSite;

    fn proceed<'c>(self, ctx: &'c mut WorkContext<C>) -> BoxFuture<'c, Result<Self::Output, Self::Error>>;
}

/// Adapts a closure to [`AdvisedCall`]
pub struct Advised<F, T, E> {
    call_site: CallSite,
    operation: F,
    _outcome: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> Advised<F, T, E> {
    pub fn new(call_site: CallSite, operation: F) -> Self {
        Self {
            call_site,
            operation,
            _outcome: PhantomData,
        }
    }
}

impl<C, F, T, E> AdvisedCall<C> for Advised<F, T, E>
where
    C: Connection,
    F: for<'c> FnOnce(&'c mut WorkContext<C>) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<PersistError> + Send + 'static,
{
    type Output = T;
    type Error = E;

    fn call_site(&self) -> &CallSite {
        &self.call_site
    }

    fn proceed<'c>(self, ctx: &'c mut WorkContext<C>) -> BoxFuture<'c, Result<T, E>> {
        (self.operation)(ctx)
    }
}

/// Runs advised calls inside units of work and transaction boundaries
///
/// Cloning is cheap; clones share the unit-of-work manager and the policy
/// registry.
pub struct TransactionInterceptor<S: ConnectionSource> {
    units: Arc<UnitOfWorkManager<S>>,
    policies: Arc<PolicyRegistry>,
}

impl<S: ConnectionSource> Clone for TransactionInterceptor<S> {
    fn clone(&self) -> Self {
        Self {
            units: Arc::clone(&self.units),
            policies: Arc::clone(&self.policies),
        }
    }
}

impl<S: ConnectionSource> TransactionInterceptor<S> {
    pub fn new(units: Arc<UnitOfWorkManager<S>>, policies: Arc<PolicyRegistry>) -> Self {
        Self { units, policies }
    }

    pub fn units(&self) -> &Arc<UnitOfWorkManager<S>> {
        &self.units
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    /// Runs `operation` as the advised call for `call_site`
    pub async fn invoke<F, T, E>(
        &self,
        ctx: &mut WorkContext<S::Connection>,
        call_site: CallSite,
        operation: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut WorkContext<S::Connection>) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: std::error::Error + From<PersistError> + Send + 'static,
    {
        self.intercept(ctx, Advised::new(call_site, operation)).await
    }

    /// Runs `call` inside a unit of work and transaction boundary
    #[instrument(skip_all, fields(context = %ctx.id(), call_site = %call.call_site()))]
    pub async fn intercept<A>(
        &self,
        ctx: &mut WorkContext<S::Connection>,
        call: A,
    ) -> Result<A::Output, A::Error>
    where
        A: AdvisedCall<S::Connection>,
    {
        let owns_unit = !self.units.is_working(ctx);
        if owns_unit {
            self.units.begin(ctx).await?;
        }

        let outcome = self.run_in_unit(ctx, call).await;

        if !owns_unit {
            return outcome;
        }
        let ended = self.units.end(ctx).await;
        match (outcome, ended) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(PersistError::from(error).into()),
            (Err(failure), Ok(())) => Err(failure),
            (Err(failure), Err(error)) => {
                warn!(error = %error, "Failed to end unit of work after a failed call");
                Err(failure)
            }
        }
    }

    async fn run_in_unit<A>(
        &self,
        ctx: &mut WorkContext<S::Connection>,
        call: A,
    ) -> Result<A::Output, A::Error>
    where
        A: AdvisedCall<S::Connection>,
    {
        let policy = self.policies.resolve(call.call_site());

        let guard = ctx.connection_guard_mut().ok_or(PersistError::OutsideWorkUnit)?;
        if !guard.is_auto_commit() {
            debug!("Joining enclosing transaction");
            return call.proceed(ctx).await;
        }
        guard.set_auto_commit(false).await.map_err(PersistError::from)?;

        match call.proceed(ctx).await {
            Ok(value) => {
                Self::complete(ctx, FailureAction::Commit).await?;
                Ok(value)
            }
            Err(failure) => {
                let action = Self::classify(&policy, &failure);
                Self::complete(ctx, action).await?;
                Err(failure)
            }
        }
    }

    fn classify<E>(policy: &TransactionPolicy, failure: &E) -> FailureAction
    where
        E: std::error::Error + 'static,
    {
        let action = policy.decide(failure);
        debug!(?action, failure = %failure, "Advised call failed");
        action
    }

    /// Closes the boundary opened by this invocation
    ///
    /// Auto-commit is back on afterwards even when the commit or rollback
    /// fails, so a unit that outlives this call has no boundary left open.
    async fn complete(
        ctx: &mut WorkContext<S::Connection>,
        action: FailureAction,
    ) -> Result<(), PersistError> {
        let guard = ctx.connection_guard_mut().ok_or(PersistError::OutsideWorkUnit)?;
        let completed = match action {
            FailureAction::Commit => guard.commit().await,
            FailureAction::Rollback => guard.rollback().await,
        };

        if let Err(error) = completed {
            if matches!(action, FailureAction::Commit) {
                if let Err(rollback_error) = guard.rollback().await {
                    warn!(error = %rollback_error, "Rollback after failed commit also failed");
                }
            }
            if let Err(restore_error) = guard.set_auto_commit(true).await {
                warn!(error = %restore_error, "Failed to re-enable auto commit after failed boundary");
            }
            return Err(error.into());
        }
        guard.set_auto_commit(true).await.map_err(PersistError::from)
    }
}
