//! Policy resolution and decision tests, including property-based checks
//! of the full interceptor protocol

use std::sync::Arc;

use persist_kernel::{
    BoxFuture, CallSite, ErrorClass, FailureAction, PolicyRegistry, TransactionInterceptor,
    TransactionPolicy, WorkContext,
};
use proptest::prelude::*;
use test_utils::*;

mod resolution_tests {
    use super::*;

    #[test]
    fn test_operation_then_type_then_default() {
        let registry = PolicyRegistry::builder()
            .operation(CallSites::reverse_entry(), TransactionPolicy::new())
            .enclosing_type::<LedgerService>(timeout_policy())
            .build();

        assert_eq!(*registry.resolve(&CallSites::reverse_entry()), TransactionPolicy::new());
        assert_eq!(*registry.resolve(&CallSites::post_entry()), timeout_policy());
        assert_eq!(*registry.resolve(&CallSites::monthly_report()), TransactionPolicy::default());
    }

    #[test]
    fn test_type_can_be_named_explicitly() {
        let registry = PolicyRegistry::builder()
            .enclosing_type_named("billing::InvoiceService", timeout_policy())
            .build();

        let site = CallSite::new("issue").within("billing::InvoiceService");

        assert_eq!(*registry.resolve(&site), timeout_policy());
        assert_eq!(*registry.resolve(&CallSite::new("issue")), TransactionPolicy::default());
    }

    #[test]
    fn test_resolution_is_memoized_per_call_site() {
        let registry = PolicyRegistry::builder()
            .enclosing_type::<LedgerService>(timeout_policy())
            .build();

        let first = registry.resolve(&CallSites::post_entry());
        let again = registry.resolve(&CallSites::post_entry());
        let sibling = registry.resolve(&CallSites::reverse_entry());

        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &sibling));
        assert_eq!(registry.cached_len(), 2);
    }

    #[test]
    fn test_concurrent_resolution_agrees() {
        let registry = Arc::new(
            PolicyRegistry::builder()
                .enclosing_type::<LedgerService>(timeout_policy())
                .build(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve(&CallSites::post_entry()))
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.join().unwrap(), timeout_policy());
        }
        assert_eq!(registry.cached_len(), 1);
    }
}

mod decision_tests {
    use super::*;

    #[test]
    fn test_first_matching_rule_with_exception() {
        let policy = TransactionPolicy::new()
            .rollback_on(ErrorClass::of::<SqlTimeoutError>())
            .rollback_on(ErrorClass::any())
            .ignore(ErrorClass::of::<ValidationError>());

        assert_eq!(policy.decide(&AppError::timeout()), FailureAction::Rollback);
        assert_eq!(policy.decide(&AppError::validation("x")), FailureAction::Commit);
        assert_eq!(policy.decide(&AppError::Other("boom".into())), FailureAction::Rollback);
    }

    #[test]
    fn test_ignore_without_rollback_match_commits() {
        let policy = TransactionPolicy::new()
            .rollback_on(ErrorClass::of::<SqlTimeoutError>())
            .ignore(ErrorClass::any());

        assert_eq!(policy.decide(&AppError::validation("x")), FailureAction::Commit);
        assert_eq!(policy.decide(&AppError::timeout()), FailureAction::Commit);
    }

    #[test]
    fn test_predicate_class() {
        let slow = ErrorClass::matching("slow", |error| {
            error
                .downcast_ref::<SqlTimeoutError>()
                .is_some_and(|timeout| timeout.elapsed_ms > 1_000)
        });
        let policy = TransactionPolicy::new().rollback_on(slow);

        assert_eq!(policy.decide(&AppError::timeout()), FailureAction::Rollback);
        assert_eq!(
            policy.decide(&AppError::from(SqlTimeoutError { elapsed_ms: 10 })),
            FailureAction::Commit
        );
    }

    #[test]
    fn test_policy_accessors() {
        let policy = lenient_policy();

        assert_eq!(policy.rollback_classes(), &[ErrorClass::any()]);
        assert_eq!(policy.ignored_classes(), &[ErrorClass::of::<ValidationError>()]);
        assert_eq!(policy.ignored_classes()[0].name(), std::any::type_name::<ValidationError>());
    }
}

type Interceptor = TransactionInterceptor<MockConnectionSource>;
type Ctx = WorkContext<MockConnection>;

/// Nests `depth` advised calls; the innermost one fails with `failure`
fn nest<'a>(
    interceptor: &'a Interceptor,
    ctx: &'a mut Ctx,
    depth: usize,
    failure: Option<FailureKind>,
) -> BoxFuture<'a, Result<usize, AppError>> {
    Box::pin(async move {
        let inner = interceptor.clone();
        interceptor
            .invoke(ctx, CallSites::post_entry(), move |ctx| {
                Box::pin(async move {
                    if depth > 1 {
                        return nest(&inner, ctx, depth - 1, failure).await.map(|level| level + 1);
                    }
                    ctx.query()?.connection().execute("UPDATE ledger.entries SET amount_minor = 0");
                    match failure {
                        Some(kind) => Err(kind.into_error()),
                        None => Ok(1),
                    }
                })
            })
            .await
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_decision_follows_policy_shape(shape in policy_strategy(), failure in failure_strategy()) {
        let policy = shape.build();

        prop_assert_eq!(policy.decide(&failure.into_error()), shape.expected(failure));
    }

    #[test]
    fn test_nested_calls_share_one_boundary(
        shape in policy_strategy(),
        depth in nesting_depth_strategy(),
        failure in proptest::option::of(failure_strategy()),
    ) {
        let policies = PolicyRegistry::builder()
            .enclosing_type::<LedgerService>(shape.build())
            .build();
        let (module, source) = mock_module(policies);
        let interceptor = module.interceptor();
        let mut ctx = module.new_context();

        let result = runtime().block_on(nest(&interceptor, &mut ctx, depth, failure));

        let expected_action = match failure {
            None => {
                prop_assert_eq!(result.unwrap(), depth);
                FailureAction::Commit
            }
            Some(kind) => {
                let error = result.unwrap_err();
                prop_assert!(error.as_persist().is_none(), "unexpected {:?}", error);
                shape.expected(kind)
            }
        };

        let boundary_event = match expected_action {
            FailureAction::Commit => ConnectionEvent::Commit,
            FailureAction::Rollback => ConnectionEvent::Rollback,
        };
        let protocol: Vec<_> = source
            .journal()
            .into_iter()
            .filter(|event| !matches!(event, ConnectionEvent::Configured(_) | ConnectionEvent::Statement(_)))
            .collect();
        prop_assert_eq!(
            protocol,
            vec![
                ConnectionEvent::Acquired,
                ConnectionEvent::AutoCommit(false),
                boundary_event,
                ConnectionEvent::AutoCommit(true),
                ConnectionEvent::Closed,
            ]
        );
        prop_assert!(!ctx.is_active());
    }
}
