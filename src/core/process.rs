//! # Process contexts.
//!
//! A [`ProcessContext`] names one background task of a [`Supervisor`] and
//! starts it, either once ([`run`](ProcessContext::run)) or in a loop
//! ([`run_periodic`](ProcessContext::run_periodic)).
//!
//! ## Lifecycle
//! ```text
//! create_process_context(name) ──► run / run_periodic
//!                                     │ registry.try_register(name)  (collision or rerun: fatal / false)
//!                                     ▼
//!                               tokio::spawn ──► run_instrumented(root, name, body)
//!                                     │            (periodic: repeat on tick until root cancelled)
//!                                     ▼
//!                        DoneGuard::drop ──► registry.mark_done(name) + completion closed
//! ```
//!
//! ## Rules
//! - Body errors are logged inside the instrumented scope, never escalated.
//! - Completion closes exactly once, also when the body panics.
//! - A context runs once; starting it again after its run finished fails.
//! - There is no per-process cancellation: bodies observe the root scope.
//!
//! [`Supervisor`]: crate::Supervisor

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::core::supervisor::Shared;
use crate::error::FatalError;
use crate::instrument::run_instrumented;
use crate::process::Process;
use crate::scope::Scope;

/// Shortest period accepted by [`ProcessContext::run_periodic`].
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// One-shot completion signal of a process.
#[derive(Clone, Debug, Default)]
pub struct Completion(CancellationToken);

impl Completion {
    pub(crate) fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// An already-closed completion.
    pub(crate) fn done() -> Self {
        let c = Self::new();
        c.close();
        c
    }

    pub(crate) fn close(&self) {
        self.0.cancel();
    }

    /// Waits until the process finished.
    pub async fn wait(&self) {
        self.0.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Deregisters the process when the task ends, including by unwinding.
struct DoneGuard {
    shared: Arc<Shared>,
    name: String,
    done: Completion,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.shared.registry.mark_done(&self.name, &self.done);
    }
}

/// Handle for starting one named process.
///
/// A context starts one run. Once that run finished, starting the context
/// again fails with [`FatalError::ContextReused`]; create a new context to
/// run the same name again.
#[derive(Clone)]
pub struct ProcessContext {
    name: String,
    parent: Weak<Shared>,
    done: Completion,
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("name", &self.name)
            .field("done", &self.done.is_done())
            .finish()
    }
}

impl ProcessContext {
    pub(crate) fn new(name: &str, parent: Weak<Shared>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            done: Completion::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completion signal of this context's run.
    pub fn completion(&self) -> Completion {
        self.done.clone()
    }

    /// Waits until the process finished.
    pub async fn wait(&self) {
        self.done.wait().await;
    }

    /// Starts `process` once.
    ///
    /// # Panics
    /// Panics with [`FatalError::DuplicateProcess`] if a process with this
    /// name is running, [`FatalError::ContextReused`] if this context already
    /// ran, or [`FatalError::SupervisorGone`] if the supervisor was dropped.
    pub fn run<P: Process>(&self, process: P) {
        if let Err(e) = self.start(Arc::new(process), None) {
            e.raise();
        }
    }

    /// Non-raising form of [`run`](Self::run): false whenever `run` would
    /// panic.
    pub fn try_run<P: Process>(&self, process: P) -> bool {
        self.start(Arc::new(process), None).is_ok()
    }

    /// Starts `process` in a loop: run, then wait for the next tick of
    /// `period` or for the supervisor to close.
    ///
    /// Errors do not stop the loop. `period` is clamped to [`MIN_PERIOD`].
    ///
    /// # Panics
    /// Same conditions as [`run`](Self::run).
    pub fn run_periodic<P: Process>(&self, period: Duration, process: P) {
        if let Err(e) = self.start(Arc::new(process), Some(period)) {
            e.raise();
        }
    }

    /// Non-raising form of [`run_periodic`](Self::run_periodic).
    pub fn try_run_periodic<P: Process>(&self, period: Duration, process: P) -> bool {
        self.start(Arc::new(process), Some(period)).is_ok()
    }

    fn start<P: Process>(&self, process: Arc<P>, period: Option<Duration>) -> Result<(), FatalError> {
        let shared = self.parent.upgrade().ok_or_else(|| FatalError::SupervisorGone {
            name: self.name.clone(),
        })?;
        shared.registry.try_register(&self.name, &self.done)?;

        let guard = DoneGuard {
            shared,
            name: self.name.clone(),
            done: self.done.clone(),
        };
        tokio::spawn(async move {
            let root = guard.shared.root.clone();
            let name = guard.name.clone();
            match period {
                None => run_once(&root, &name, process.as_ref()).await,
                Some(period) => run_loop(&root, &name, process.as_ref(), period).await,
            }
            drop(guard);
        });
        Ok(())
    }
}

async fn run_once<P: Process>(root: &Scope, name: &str, process: &P) {
    let _ = run_instrumented(root, name, |scope| async move {
        let res = process.run(scope.clone()).await;
        if let Err(e) = &res {
            let level = if e.is_canceled() { Level::DEBUG } else { Level::ERROR };
            scope.logger().log(
                level,
                "Async process returned an error",
                &[("error", e.to_string()), ("error_kind", e.as_label().to_string())],
            );
        }
        res
    })
    .await;
}

async fn run_loop<P: Process>(root: &Scope, name: &str, process: &P, period: Duration) {
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        run_once(root, name, process).await;

        tokio::select! {
            _ = ticker.tick() => {}
            _ = root.cancelled() => break,
        }
    }
}
