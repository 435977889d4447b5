// tests/common/mod.rs
#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output; filter with `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
