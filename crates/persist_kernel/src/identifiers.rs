//! Identifiers for execution contexts, connections and advised call sites
//!
//! Context and connection identifiers are newtype wrappers around UUIDs so
//! log lines from concurrent contexts can be told apart. A [`CallSite`] is the
//! reflection-free identity of an advised operation and keys the policy cache.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered identifier
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// One per thread, task or request running advised calls
define_id!(ContextId, "CTX");

// One per physical connection handed out by a source
define_id!(ConnectionId, "CONN");

/// Identity of an advised operation
///
/// Two call sites are the same when both the operation name and the enclosing
/// type name match. The enclosing type is what type-level policies attach to.
///
/// # Example
///
/// ```rust
/// use persist_kernel::CallSite;
///
/// struct AccountService;
///
/// let site = CallSite::of::<AccountService>("transfer");
/// assert_eq!(site.operation(), "transfer");
/// assert!(site.enclosing_type().unwrap().ends_with("AccountService"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    operation: Cow<'static, str>,
    enclosing_type: Option<Cow<'static, str>>,
}

impl CallSite {
    /// Creates a call site for a free-standing operation
    pub fn new(operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            operation: operation.into(),
            enclosing_type: None,
        }
    }

    /// Creates a call site for an operation defined on `T`
    pub fn of<T: ?Sized>(operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(operation).within(std::any::type_name::<T>())
    }

    /// Sets the enclosing type name
    pub fn within(mut self, enclosing_type: impl Into<Cow<'static, str>>) -> Self {
        self.enclosing_type = Some(enclosing_type.into());
        self
    }

    /// Returns the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the enclosing type name, if any
    pub fn enclosing_type(&self) -> Option<&str> {
        self.enclosing_type.as_deref()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.enclosing_type {
            Some(owner) => write!(f, "{}::{}", owner, self.operation),
            None => f.write_str(&self.operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ledger;

    #[test]
    fn test_context_id_display() {
        let id = ContextId::new();
        assert!(id.to_string().starts_with("CTX-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = ConnectionId::new();
        let parsed: ConnectionId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_call_site_identity_includes_enclosing_type() {
        let plain = CallSite::new("post");
        let owned = CallSite::of::<Ledger>("post");

        assert_ne!(plain, owned);
        assert_eq!(owned, CallSite::of::<Ledger>("post"));
        assert!(owned.to_string().ends_with("Ledger::post"));
    }
}
