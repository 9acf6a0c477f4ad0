//! Example pacing a cleanup job and a request loop side by side
//!
//! This example shows how to:
//! 1. Load pacer settings from the environment (or a `.env` file)
//! 2. Run a backoff scheduler that slows down after every fire
//! 3. Gate a request loop on a token bucket
//! 4. Stop both with a single timeout context
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=pacer=debug cargo run --example cadence --features trace
//! ```
//!
//! Tune the cadence with `PACER_BACKOFF_BASE_MS`, `PACER_BACKOFF_STEP_MS`,
//! `PACER_LIMIT_CAPACITY` and `PACER_LIMIT_RATE`.

use std::sync::Arc;
use std::time::Duration;

use pacer::clock::TokioClock;
use pacer::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PacerConfig::from_env()?;
    config.validate()?;
    println!("⚙️  {config:?}\n");

    let clock = TokioClock::shared();
    let ctx = Context::with_timeout(Arc::clone(&clock), Duration::from_secs(8));

    let scheduler = BackoffScheduler::from_config(&config.scheduler, Arc::clone(&clock))?;
    let started = clock.now();
    let job_clock = Arc::clone(&clock);
    let cleanup = scheduler.start(ctx.clone(), move || {
        println!("🧹 cleanup at {:?}", job_clock.now() - started);
    });

    let limiter = TokenBucket::from_config(&config.limiter, Arc::clone(&clock))?;
    let mut sent = 0u32;
    loop {
        match limiter.wait(&ctx).await {
            Ok(()) => {
                sent += 1;
                println!("📤 request #{sent} at {:?}", clock.now() - started);
            }
            Err(err) => {
                println!("\n⏹️  request loop stopped: {err}");
                break;
            }
        }
    }

    let fires = cleanup.join().await?;
    println!("✅ {sent} requests sent, cleanup ran {fires} times");
    Ok(())
}
