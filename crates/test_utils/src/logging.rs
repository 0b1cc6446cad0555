//! Test log output
//!
//! Routes `tracing` output through the test harness so it shows up only for
//! failing tests. Filtering follows `RUST_LOG`, defaulting to debug output
//! from the persistence crates.

use once_cell::sync::Lazy;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("persist_kernel=debug,infra_db=debug"));

    // Another harness may already have installed a subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(true))
        .try_init();
});

/// Installs the test subscriber once per process
pub fn init_tracing() {
    Lazy::force(&TRACING);
}
