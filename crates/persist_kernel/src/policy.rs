//! Transaction policies and their resolution per call site
//!
//! A [`TransactionPolicy`] decides whether a failure escaping an advised call
//! rolls the transaction back or still commits it. Policies are registered up
//! front against an operation or its enclosing type and resolved through a
//! [`PolicyRegistry`], which memoizes the result per [`CallSite`].
//!
//! # Decision
//!
//! Only the first `rollback_on` classifier matching the failure is consulted.
//! If none matches, the transaction commits. If one matches and any `ignore`
//! classifier also matches, the transaction still commits. Otherwise it rolls
//! back. In every case the failure itself is re-thrown afterwards.
//!
//! ```rust
//! use persist_kernel::{ErrorClass, FailureAction, TransactionPolicy};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("lock wait timeout")]
//! struct LockTimeout;
//!
//! let policy = TransactionPolicy::new()
//!     .rollback_on(ErrorClass::any())
//!     .ignore(ErrorClass::of::<LockTimeout>());
//!
//! assert_eq!(policy.decide(&LockTimeout), FailureAction::Commit);
//! ```

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::identifiers::CallSite;

type Predicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

#[derive(Clone)]
enum Matcher {
    Any,
    Type {
        type_id: TypeId,
        test: fn(&(dyn Error + 'static)) -> bool,
    },
    Predicate(Predicate),
}

fn is_instance<T: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<T>()
}

/// Classifier for failures, with instance-of semantics
///
/// A type classifier matches a failure of that type and any failure that
/// carries one in its [`source`](Error::source) chain, the way a subclass
/// instance matches its superclass.
#[derive(Clone)]
pub struct ErrorClass {
    name: Cow<'static, str>,
    matcher: Matcher,
}

impl ErrorClass {
    /// Matches every failure
    pub fn any() -> Self {
        Self {
            name: Cow::Borrowed("any"),
            matcher: Matcher::Any,
        }
    }

    /// Matches failures of type `T` or caused by one
    pub fn of<T: Error + 'static>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<T>()),
            matcher: Matcher::Type {
                type_id: TypeId::of::<T>(),
                test: is_instance::<T>,
            },
        }
    }

    /// Matches failures for which `predicate` holds anywhere in the source chain
    ///
    /// Classifiers built this way compare equal when their names are equal.
    pub fn matching<F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Matcher::Predicate(Arc::new(predicate)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if `failure` belongs to this class
    pub fn matches(&self, failure: &(dyn Error + 'static)) -> bool {
        let test: &dyn Fn(&(dyn Error + 'static)) -> bool = match &self.matcher {
            Matcher::Any => return true,
            Matcher::Type { test, .. } => test,
            Matcher::Predicate(predicate) => predicate.as_ref(),
        };

        let mut current = Some(failure);
        while let Some(error) = current {
            if test(error) {
                return true;
            }
            current = error.source();
        }
        false
    }
}

impl PartialEq for ErrorClass {
    fn eq(&self, other: &Self) -> bool {
        match (&self.matcher, &other.matcher) {
            (Matcher::Any, Matcher::Any) => true,
            (Matcher::Type { type_id: a, .. }, Matcher::Type { type_id: b, .. }) => a == b,
            (Matcher::Predicate(_), Matcher::Predicate(_)) => self.name == other.name,
            _ => false,
        }
    }
}

impl Eq for ErrorClass {}

impl fmt::Debug for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorClass").field(&self.name).finish()
    }
}

/// What happens to the open transaction when an advised call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Commit,
    Rollback,
}

/// Rollback rules of one call site
///
/// [`TransactionPolicy::default`] rolls back on every failure and ignores
/// nothing. [`TransactionPolicy::new`] starts with empty lists, which commits
/// on every failure until classifiers are added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPolicy {
    rollback_on: Vec<ErrorClass>,
    ignore: Vec<ErrorClass>,
}

impl TransactionPolicy {
    pub fn new() -> Self {
        Self {
            rollback_on: Vec::new(),
            ignore: Vec::new(),
        }
    }

    /// Appends a rollback-triggering classifier
    pub fn rollback_on(mut self, class: ErrorClass) -> Self {
        self.rollback_on.push(class);
        self
    }

    /// Appends a classifier excepted from rollback
    pub fn ignore(mut self, class: ErrorClass) -> Self {
        self.ignore.push(class);
        self
    }

    pub fn rollback_classes(&self) -> &[ErrorClass] {
        &self.rollback_on
    }

    pub fn ignored_classes(&self) -> &[ErrorClass] {
        &self.ignore
    }

    /// Decides between commit and rollback for `failure`
    pub fn decide(&self, failure: &(dyn Error + 'static)) -> FailureAction {
        let Some(rule) = self.rollback_on.iter().find(|class| class.matches(failure)) else {
            return FailureAction::Commit;
        };

        match self.ignore.iter().find(|class| class.matches(failure)) {
            Some(exception) => {
                debug!(rollback_on = rule.name(), ignore = exception.name(), "Failure excepted from rollback");
                FailureAction::Commit
            }
            None => FailureAction::Rollback,
        }
    }
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self::new().rollback_on(ErrorClass::any())
    }
}

/// Call-site policies, resolved operation first, then enclosing type
///
/// Resolutions are cached for the life of the registry. Concurrent
/// resolutions of the same call site may both populate the cache; they
/// produce equal policies, so the last write wins harmlessly.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    operations: HashMap<CallSite, Arc<TransactionPolicy>>,
    types: HashMap<Cow<'static, str>, Arc<TransactionPolicy>>,
    fallback: Arc<TransactionPolicy>,
    cache: RwLock<HashMap<CallSite, Arc<TransactionPolicy>>>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Returns the policy for `site`
    pub fn resolve(&self, site: &CallSite) -> Arc<TransactionPolicy> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(site)
            .cloned();
        if let Some(policy) = cached {
            return policy;
        }

        let policy = self.lookup(site);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(site.clone(), Arc::clone(&policy));
        policy
    }

    fn lookup(&self, site: &CallSite) -> Arc<TransactionPolicy> {
        if let Some(policy) = self.operations.get(site) {
            debug!(call_site = %site, "Using operation policy");
            return Arc::clone(policy);
        }
        if let Some(policy) = site.enclosing_type().and_then(|owner| self.types.get(owner)) {
            debug!(call_site = %site, "Using enclosing type policy");
            return Arc::clone(policy);
        }
        debug!(call_site = %site, "Using default policy");
        Arc::clone(&self.fallback)
    }

    /// Number of memoized call sites
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Collects call-site metadata before the registry is shared
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    operations: HashMap<CallSite, Arc<TransactionPolicy>>,
    types: HashMap<Cow<'static, str>, Arc<TransactionPolicy>>,
}

impl PolicyRegistryBuilder {
    /// Attaches a policy to one operation
    pub fn operation(mut self, site: CallSite, policy: TransactionPolicy) -> Self {
        self.operations.insert(site, Arc::new(policy));
        self
    }

    /// Attaches a policy to every operation enclosed by `T`
    pub fn enclosing_type<T: ?Sized>(self, policy: TransactionPolicy) -> Self {
        self.enclosing_type_named(std::any::type_name::<T>(), policy)
    }

    pub fn enclosing_type_named(
        mut self,
        type_name: impl Into<Cow<'static, str>>,
        policy: TransactionPolicy,
    ) -> Self {
        self.types.insert(type_name.into(), Arc::new(policy));
        self
    }

    pub fn build(self) -> PolicyRegistry {
        PolicyRegistry {
            operations: self.operations,
            types: self.types,
            fallback: Arc::new(TransactionPolicy::default()),
            cache: RwLock::new(HashMap::new()),
        }
    }
}
