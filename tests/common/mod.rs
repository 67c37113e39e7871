//! Shared helpers for router integration tests

use portmesh::transport::memory;
use portmesh::{Router, Rtt};
use std::time::Duration;

/// Initialize test tracing output (safe to call from every test)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("portmesh=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Wire two routers together with an in-memory duplex channel
pub fn link(a: &Router, b: &Router, rtt: Rtt) {
    let (a_end, b_end) = memory::pair();
    a.add_direct(b.address(), a_end.0, a_end.1, rtt);
    b.add_direct(a.address(), b_end.0, b_end.1, rtt);
}

/// Poll a condition until it holds or a generous deadline passes
pub async fn eventually<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never reached: {what}");
}
