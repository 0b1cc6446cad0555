//! Persistence module wiring
//!
//! The [`PersistModule`] is the single point where a connection source, the
//! query configuration and the call-site policies come together. It owns the
//! shared [`UnitOfWorkManager`] and hands out [`TransactionInterceptor`]s and
//! fresh [`WorkContext`]s.
//!
//! # Usage
//!
//! ```rust,ignore
//! use persist_kernel::{PersistModule, PolicyRegistry, QueryConfig, SqlDialect};
//!
//! let module = PersistModule::builder(source)
//!     .query_config(QueryConfig::new(SqlDialect::Postgres))
//!     .policies(PolicyRegistry::builder().enclosing_type::<LedgerService>(policy).build())
//!     .build();
//!
//! module.start();
//! let mut ctx = module.new_context();
//! let interceptor = module.interceptor();
//! ```

use std::sync::Arc;

use crate::interceptor::TransactionInterceptor;
use crate::policy::PolicyRegistry;
use crate::ports::ConnectionSource;
use crate::query::QueryConfig;
use crate::unit_of_work::{UnitOfWorkManager, WorkContext};

/// Wired persistence components sharing one connection source
pub struct PersistModule<S: ConnectionSource> {
    units: Arc<UnitOfWorkManager<S>>,
    interceptor: TransactionInterceptor<S>,
}

impl<S: ConnectionSource> PersistModule<S> {
    /// Starts a builder with the default query configuration and no policies
    pub fn builder(source: S) -> PersistModuleBuilder<S> {
        PersistModuleBuilder {
            source,
            query: QueryConfig::default(),
            policies: None,
        }
    }

    pub fn units(&self) -> &Arc<UnitOfWorkManager<S>> {
        &self.units
    }

    /// Returns an interceptor sharing this module's manager and policies
    pub fn interceptor(&self) -> TransactionInterceptor<S> {
        self.interceptor.clone()
    }

    /// Creates an idle execution context
    pub fn new_context(&self) -> WorkContext<S::Connection> {
        WorkContext::new()
    }

    pub fn start(&self) {
        self.units.start();
    }

    pub fn stop(&self) {
        self.units.stop();
    }
}

/// Builder for [`PersistModule`]
pub struct PersistModuleBuilder<S: ConnectionSource> {
    source: S,
    query: QueryConfig,
    policies: Option<PolicyRegistry>,
}

impl<S: ConnectionSource> PersistModuleBuilder<S> {
    pub fn query_config(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn build(self) -> PersistModule<S> {
        let units = Arc::new(UnitOfWorkManager::new(self.source, self.query));
        let policies = Arc::new(self.policies.unwrap_or_default());
        PersistModule {
            interceptor: TransactionInterceptor::new(Arc::clone(&units), policies),
            units,
        }
    }
}
