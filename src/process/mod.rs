//! # Process abstraction.
//!
//! A [`Process`] is the body of a supervised background task. It receives the
//! instrumented [`Scope`] of its run and returns a [`ProcessError`] on failure.
//!
//! Any `Fn(Scope) -> impl Future<Output = Result<(), ProcessError>>` closure is
//! a process, so ad-hoc bodies need no named type.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use visibility::{Process, ProcessError, Scope};
//!
//! struct Poller;
//!
//! #[async_trait]
//! impl Process for Poller {
//!     async fn run(&self, scope: Scope) -> Result<(), ProcessError> {
//!         if scope.is_cancelled() {
//!             return Err(ProcessError::Canceled);
//!         }
//!         scope.metrics().add_count("Polled", 1.0);
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::scope::Scope;

/// Body of a supervised process.
///
/// Implementations should watch `scope.cancelled()` and exit promptly once the
/// supervisor closes.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    /// Runs one execution of the body.
    async fn run(&self, scope: Scope) -> Result<(), ProcessError>;
}

#[async_trait]
impl<F, Fut> Process for F
where
    F: Fn(Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    async fn run(&self, scope: Scope) -> Result<(), ProcessError> {
        (self)(scope).await
    }
}
