//! # visibility
//!
//! **Visibility** supervises long-running background processes inside a
//! service and runs every unit of work through one instrumentation wrapper
//! that provides tracing, metrics, structured logging and panic reporting.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Process    │   │   Process    │   │   Process    │
//!     │  (closure)   │   │ (named type) │   │  (periodic)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - root Scope (logger, tracer, sink, cancellation)                │
//! │  - Registry (name → Completion, live count)                       │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  run_instrumented(scope, name, body)                              │
//! │  - Span (Tracer)          - MetricAccumulator → span + sink       │
//! │  - named Logger           - StackCapture on panic, re-raise       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! create_process_context(name) ──► run(body) ──► tokio::spawn
//!
//!   run_instrumented
//!     ├─► start span, derive scope {span, logger, metrics, client type}
//!     ├─► body(scope) under catch_unwind
//!     ├─► metrics → span tags + sink distributions
//!     ├─ Ok    ─► finish span
//!     ├─ Err   ─► log "Async process returned an error", finish span with error
//!     └─ panic ─► error.stack / panic tags, finish span, resume unwinding
//!
//!   on task end (any outcome): deregister, close Completion
//!
//! close() ──► cancel root scope ──► wait until live count == 0
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / functions                          |
//! |-------------------|--------------------------------------------------------------|------------------------------------------------|
//! | **Supervision**   | Named one-shot and periodic background processes.            | [`Supervisor`], [`ProcessContext`], [`Process`] |
//! | **Instrumentation**| Span, logger and metrics around any unit of work.           | [`run_instrumented`], [`instrument_with_metrics`] |
//! | **Metrics**       | Per-call accumulation with unit normalization.               | [`MetricAccumulator`], [`Unit`], [`MetricsSink`] |
//! | **Stacks**        | De-noised stack traces starting at the panic site.           | [`StackCapture`], [`StackElement`]             |
//! | **Scope**         | Immutable carrier of the ambient collaborators.              | [`Scope`]                                      |
//! | **Errors**        | Fatal, process and runtime errors.                           | [`FatalError`], [`ProcessError`], [`RuntimeError`] |
//! | **Configuration** | Service identity, agent, logging, grace.                     | [`Config`], [`Visibility`]                     |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use visibility::{
//!     Logger, MetricsSink, ProcessError, RecordingSink, Scope, Supervisor, Unit,
//!     run_instrumented,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let sink = Arc::new(RecordingSink::new());
//!     let scope = Scope::new()
//!         .with_logger(Logger::nop())
//!         .with_metrics_sink(sink.clone());
//!
//!     let res: Result<(), String> = run_instrumented(&scope, "upload", |s| async move {
//!         s.metrics().add_metric("Size", 2.0, Unit::Kilobytes);
//!         Ok(())
//!     })
//!     .await;
//!     assert!(res.is_ok());
//!     assert_eq!(sink.distribution_value("upload.Size"), Some(2048.0));
//!
//!     let sup = Supervisor::new(&scope);
//!     sup.create_process_context("once").run(|_s: Scope| async { Ok::<(), ProcessError>(()) });
//!     sup.close().await;
//! }
//! ```

mod core;
mod error;
mod instrument;
mod process;
mod scope;
mod setup;

pub mod logging;
pub mod metrics;
pub mod stack;
pub mod trace;

// ---- Public re-exports ----

pub use core::config::{
    ENV_AGENT_HOST, ENV_APP_NAME, ENV_ENV_NAME, ENV_GRACE_SECS, ENV_HOSTNAME, ENV_LOG_FILTER,
    ENV_LOG_FORMAT, ENV_STATSD_PORT,
};
pub use core::shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use core::{Completion, Config, MIN_PERIOD, ProcessContext, Supervisor};
pub use error::{FatalError, ProcessError, RuntimeError};
pub use instrument::{SPAN_TYPE_BACKGROUND, instrument_with_metrics, run_instrumented};
pub use logging::{LogFormat, Logger, MemoryLog};
pub use metrics::{
    MetricAccumulator, MetricEntry, MetricsRecorderSink, MetricsSink, NoopSink, RecordingSink,
    TimeMeasurement, Unit,
};
pub use process::Process;
pub use scope::Scope;
pub use setup::Visibility;
pub use stack::{StackCapture, StackElement};
pub use trace::{
    CLIENT_TYPE_CANARY, CLIENT_TYPE_NORMAL, CLIENT_TYPE_TAG, MockTracer, Span, TagValue, Tracer,
    client_type_from_span,
};
