//! Instrumented execution wrapper.
//!
//! - [`runner`]: [`run_instrumented`] (span, logger, metrics, panic reporting);
//! - [`outcome`]: [`instrument_with_metrics`] (Success/Error/Fault/Time).

mod outcome;
mod runner;

pub use outcome::instrument_with_metrics;
pub use runner::{SPAN_TYPE_BACKGROUND, run_instrumented};
