//! Shared test helper: wires `tracing` output to the test harness so
//! pool/worker lifecycle events (`src/pool.rs`) are visible with
//! `cargo test -- --nocapture`.

/// Installs a `tracing-subscriber` writer scoped to the test harness.
/// Safe to call from every test in a binary; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
