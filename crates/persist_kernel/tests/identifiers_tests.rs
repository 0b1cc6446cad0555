//! Unit tests for context, connection and call-site identifiers

use std::collections::HashSet;

use persist_kernel::{CallSite, ConnectionId, ContextId};
use uuid::Uuid;

mod context_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        assert_ne!(ContextId::new(), ContextId::new());
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let first = ContextId::new();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = ContextId::new();

        assert!(first.as_uuid() < second.as_uuid());
    }

    #[test]
    fn test_prefix_and_display() {
        let id = ContextId::new();

        assert_eq!(ContextId::prefix(), "CTX");
        assert_eq!(id.to_string(), format!("CTX-{}", id.as_uuid()));
    }

    #[test]
    fn test_parse_with_and_without_prefix() {
        let uuid = Uuid::new_v4();

        let prefixed: ContextId = format!("CTX-{}", uuid).parse().unwrap();
        let bare: ContextId = uuid.to_string().parse().unwrap();

        assert_eq!(prefixed, bare);
        assert_eq!(Uuid::from(prefixed), uuid);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("CTX-not-a-uuid".parse::<ContextId>().is_err());
    }
}

mod connection_id_tests {
    use super::*;

    #[test]
    fn test_prefix() {
        assert_eq!(ConnectionId::prefix(), "CONN");
        assert!(ConnectionId::new().to_string().starts_with("CONN-"));
    }

    #[test]
    fn test_uuid_conversions() {
        let uuid = Uuid::new_v4();
        let id = ConnectionId::from_uuid(uuid);

        assert_eq!(*id.as_uuid(), uuid);
        assert_eq!(ConnectionId::from(uuid), id);
    }
}

mod call_site_tests {
    use super::*;

    struct Billing;
    struct Claims;

    #[test]
    fn test_free_standing_operation() {
        let site = CallSite::new("nightly_close");

        assert_eq!(site.operation(), "nightly_close");
        assert_eq!(site.enclosing_type(), None);
        assert_eq!(site.to_string(), "nightly_close");
    }

    #[test]
    fn test_same_operation_on_different_types_differs() {
        let sites: HashSet<_> = [
            CallSite::of::<Billing>("settle"),
            CallSite::of::<Claims>("settle"),
            CallSite::of::<Billing>("settle"),
        ]
        .into_iter()
        .collect();

        assert_eq!(sites.len(), 2);
    }

    #[test]
    fn test_within_overrides_enclosing_type() {
        let site = CallSite::of::<Billing>("settle").within("ledger::Journal");

        assert_eq!(site.enclosing_type(), Some("ledger::Journal"));
        assert_eq!(site.to_string(), "ledger::Journal::settle");
    }
}
