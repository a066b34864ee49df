//! Runtime core: process supervision and lifecycle.
//!
//! Public API from this module: [`Supervisor`], [`ProcessContext`],
//! [`Completion`] and [`Config`].
//!
//! Internal modules:
//! - [`supervisor`]: owns the root scope, closes and drains;
//! - [`process`]: starts one-shot and periodic processes;
//! - [`registry`]: running processes and the live count;
//! - [`shutdown`]: cross-platform termination signals;
//! - [`config`]: runtime configuration.

pub mod config;
mod process;
mod registry;
pub mod shutdown;
mod supervisor;

pub use config::Config;
pub use process::{Completion, MIN_PERIOD, ProcessContext};
pub use supervisor::Supervisor;
