//! # Supervisor: runs named background processes and drains them on close.
//!
//! The [`Supervisor`] owns a cancellable root [`Scope`], the registry of running
//! processes and the [`Config`] used for signal-driven shutdown.
//!
//! ## High-level architecture
//! ```text
//! Supervisor::new(&scope)
//!   root = scope + child CancellationToken
//!
//! Start processes:
//!   create_process_context("a")  create_process_context("b")  ...
//!        │                             │
//!        └──► ProcessContext::run / run_periodic
//!                 └──► registry.try_register(name)
//!                      tokio::spawn(run_instrumented(root, name, body))
//!
//! Shutdown path:
//!   close()          : log running set ─► cancel root ─► wait live count == 0
//!   close_within(g)  : same, bounded by g ─► RuntimeError::GraceExceeded { stuck }
//!   close_on_signal(): wait_for_shutdown_signal() ─► log signal ─► close within cfg.grace_limit()
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use visibility::{Logger, ProcessError, Scope, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let scope = Scope::new().with_logger(Logger::nop());
//!     let sup = Supervisor::new(&scope);
//!
//!     sup.create_process_context("ticker").run_periodic(
//!         Duration::from_millis(10),
//!         |s: Scope| async move {
//!             s.metrics().add_count("Ticks", 1.0);
//!             Ok::<(), ProcessError>(())
//!         },
//!     );
//!     assert!(sup.has_process("ticker"));
//!
//!     sup.close().await;
//!     assert_eq!(sup.log_running(), "");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::core::config::{Config, grace_limit};
use crate::core::process::{Completion, ProcessContext};
use crate::core::registry::Registry;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::scope::Scope;

/// State shared between the supervisor and its running processes.
pub(crate) struct Shared {
    pub(crate) root: Scope,
    pub(crate) token: CancellationToken,
    pub(crate) registry: Registry,
    pub(crate) config: Config,
}

/// Process supervisor.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Creates a supervisor whose root scope extends `scope` with a child
    /// cancellation token.
    pub fn new(scope: &Scope) -> Self {
        Self::with_config(scope, Config::default())
    }

    pub fn with_config(scope: &Scope, config: Config) -> Self {
        let token = match scope.cancel_token() {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let root = scope.with_cancel_token(token.clone());
        Self {
            shared: Arc::new(Shared {
                root,
                token,
                registry: Registry::new(),
                config,
            }),
        }
    }

    /// Root scope handed to every process.
    pub fn root(&self) -> &Scope {
        &self.shared.root
    }

    /// Builds a context for the process `name`; nothing is registered yet.
    pub fn create_process_context(&self, name: &str) -> ProcessContext {
        ProcessContext::new(name, Arc::downgrade(&self.shared))
    }

    pub fn has_process(&self, name: &str) -> bool {
        self.shared.registry.has(name)
    }

    /// Sorted names of running processes, joined with `", "`.
    pub fn log_running(&self) -> String {
        self.shared.registry.names().join(", ")
    }

    pub fn running_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Completion of the running process `name`; already closed if no such
    /// process is running.
    pub fn wait_channel(&self, name: &str) -> Completion {
        self.shared.registry.wait_channel(name)
    }

    /// Cancels the root scope and waits for every process to finish.
    ///
    /// # Panics
    /// Panics if the root scope carries no logger.
    pub async fn close(&self) {
        let logger = self.shared.root.logger();
        logger.info(&format!(
            "Closing the process registry with {} processes running: {}",
            self.running_count(),
            self.log_running()
        ));
        self.shared.token.cancel();
        self.shared.registry.drain().await;
        logger.info("Finished waiting for processes to finish");
    }

    /// Like [`close`](Self::close), but gives up after `grace`
    /// (`Duration::ZERO` waits forever).
    pub async fn close_within(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.close_bounded(grace_limit(grace)).await
    }

    async fn close_bounded(&self, limit: Option<Duration>) -> Result<(), RuntimeError> {
        let Some(grace) = limit else {
            self.close().await;
            return Ok(());
        };
        match tokio::time::timeout(grace, self.close()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let stuck = self.shared.registry.names();
                self.shared.root.logger().warn(&format!(
                    "Shutdown grace of {grace:?} exceeded, still running: {}",
                    stuck.join(", ")
                ));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Waits for a termination signal, then closes within the configured grace.
    pub async fn close_on_signal(&self) -> Result<(), RuntimeError> {
        let signal = shutdown::wait_for_shutdown_signal().await?;
        self.shared.root.logger().log(
            Level::INFO,
            "Shutdown signal received",
            &[("signal", signal.to_string())],
        );
        self.close_bounded(self.shared.config.grace_limit()).await
    }
}
