//! Custom Test Assertions
//!
//! Provides assertion helpers over the mock connection journal that give
//! more meaningful error messages than standard assertions.

use persist_kernel::{Connection, WorkContext};

use crate::mock::{ConnectionEvent, MockConnectionSource};

/// Asserts the journal, ignoring `Configured` and `Statement` events
///
/// # Panics
///
/// Panics with the full journal if the protocol events differ
pub fn assert_protocol(source: &MockConnectionSource, expected: &[ConnectionEvent]) {
    let journal = source.journal();
    let protocol: Vec<_> = journal
        .iter()
        .filter(|event| {
            !matches!(
                event,
                ConnectionEvent::Configured(_) | ConnectionEvent::Statement(_)
            )
        })
        .cloned()
        .collect();

    assert_eq!(
        protocol, expected,
        "Unexpected transaction protocol, full journal: {:#?}",
        journal
    );
}

/// Asserts exactly one commit and no rollback
pub fn assert_committed_once(source: &MockConnectionSource) {
    assert_eq!(
        (source.commits(), source.rollbacks()),
        (1, 0),
        "Expected one commit and no rollback, journal: {:#?}",
        source.journal()
    );
}

/// Asserts exactly one rollback and no commit
pub fn assert_rolled_back_once(source: &MockConnectionSource) {
    assert_eq!(
        (source.commits(), source.rollbacks()),
        (0, 1),
        "Expected one rollback and no commit, journal: {:#?}",
        source.journal()
    );
}

/// Asserts that every acquired connection was given back
pub fn assert_all_released(source: &MockConnectionSource) {
    assert_eq!(
        source.open_connections(),
        0,
        "{} of {} connections were never closed",
        source.open_connections(),
        source.acquired()
    );
}

/// Asserts that no unit of work is bound to `ctx`
pub fn assert_idle<C: Connection>(ctx: &WorkContext<C>) {
    assert!(
        !ctx.is_active(),
        "Expected context {} to be idle",
        ctx.id()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use persist_kernel::ConnectionSource;

    #[tokio::test]
    async fn test_protocol_skips_statements() {
        let source = MockConnectionSource::new();
        let mut connection = source.acquire().await.unwrap();
        connection.execute("SELECT 1");

        assert_protocol(&source, &[ConnectionEvent::Acquired]);
    }

    #[test]
    #[should_panic(expected = "connections were never closed")]
    fn test_unreleased_connection_fails() {
        let source = MockConnectionSource::new();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _connection = runtime.block_on(source.acquire()).unwrap();

        assert_all_released(&source);
    }
}
