//! Common test utilities and helpers

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once per binary. Set `RUST_LOG=pacer=trace`
/// to see scheduler and limiter events.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run until they block on their next timer.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
