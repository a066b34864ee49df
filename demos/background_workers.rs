//! # Demo: background_workers
//!
//! A service with one periodic poller, one long-running consumer and one
//! instrumented request handler, shut down by Ctrl-C or after a few seconds.
//!
//! Demonstrates how to:
//! - Set up logging and metrics from the environment with [`Visibility`].
//! - Run a named [`Process`] type and a closure under a [`Supervisor`].
//! - Count outcomes with [`instrument_with_metrics`].
//! - Drain processes within the configured grace.
//!
//! ## Flow
//! ```text
//! Config::from_env ──► Visibility::setup ──► Supervisor::with_config
//!     ├─► "poller"   run_periodic(250ms)  (Success/Error/Fault/Time per tick)
//!     ├─► "consumer" run                  (waits for cancellation)
//!     ├─► run_instrumented("handle_request")
//!     └─► signal or timeout ──► close_within(grace) ──► teardown
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example background_workers
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use visibility::{
    Config, Process, ProcessError, Scope, Supervisor, Unit, Visibility, instrument_with_metrics,
    run_instrumented,
};

/// Polls an imaginary queue; every third poll fails.
struct Poller {
    polls: AtomicU64,
}

#[async_trait]
impl Process for Poller {
    async fn run(&self, scope: Scope) -> Result<(), ProcessError> {
        let n = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        instrument_with_metrics(&scope, |s| async move {
            s.metrics().add_metric("Fetched", (n * 512) as f64, Unit::Bytes);
            if n % 3 == 0 {
                return Err(ProcessError::fail(format!("poll {n} timed out")));
            }
            s.logger().debug("Poll complete");
            Ok(())
        })
        .await
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and ambient collaborators
    let mut cfg = Config::from_env()?;
    if cfg.app_name == Config::default().app_name {
        cfg.app_name = "DemoWorkers".to_string();
    }
    cfg.grace = Duration::from_secs(2);
    let vis = Visibility::setup(&cfg)?;

    // 2. Supervisor over the root scope
    let sup = Supervisor::with_config(vis.scope(), cfg.clone());

    // 3. Periodic named process
    sup.create_process_context("poller").run_periodic(
        Duration::from_millis(250),
        Poller {
            polls: AtomicU64::new(0),
        },
    );

    // 4. Long-running closure process
    let consumed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&consumed);
    sup.create_process_context("consumer").run(move |s: Scope| {
        let counter = Arc::clone(&counter);
        async move {
            loop {
                tokio::select! {
                    _ = s.cancelled() => return Err(ProcessError::Canceled),
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    });

    // 5. A unit of work outside the supervisor
    let res: Result<u64, String> = run_instrumented(vis.scope(), "handle_request", |s| async move {
        s.metrics().add_count("Items", 3.0);
        s.logger().info("Handled request");
        Ok(3)
    })
    .await;
    vis.scope().logger().info(&format!("Request result: {res:?}"));

    // 6. Stop on Ctrl-C or after three seconds
    tokio::select! {
        res = sup.close_on_signal() => res?,
        _ = tokio::time::sleep(Duration::from_secs(3)) => {
            vis.scope().logger().info(&format!("Running: {}", sup.log_running()));
            sup.close_within(cfg.grace).await?;
        }
    }

    vis.scope().logger().info(&format!(
        "Consumer handled {} items",
        consumed.load(Ordering::Relaxed)
    ));
    vis.teardown();
    Ok(())
}
