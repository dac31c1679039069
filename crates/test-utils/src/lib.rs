// crates/test-utils/src/lib.rs

//! Shared helpers for autobuilder integration tests.

pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use autobuilder::types::TaskParameters;
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for any single awaited step in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a per-test capturing subscriber once per process.
///
/// Output only shows for failing tests (or with `--nocapture`); the filter is
/// read from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another harness may already have installed one.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`] so a stuck runtime fails the
/// test instead of hanging it.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}

/// Parameters object from a `serde_json::json!` literal.
pub fn params(value: serde_json::Value) -> TaskParameters {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("parameters must be a JSON object, got {other}"),
    }
}
