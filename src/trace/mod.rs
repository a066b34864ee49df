//! Tracing collaborator contract and test double.
//!
//! - [`span`]: [`Tracer`] / [`Span`] traits, tag values, client classification;
//! - [`mock`]: [`MockTracer`] recording finished spans.

mod mock;
mod span;

pub use mock::{FinishedSpan, MockTracer};
pub use span::{
    CLIENT_TYPE_CANARY, CLIENT_TYPE_NORMAL, CLIENT_TYPE_TAG, NoopSpan, NoopTracer, Span,
    TagValue, Tracer, client_type_from_span,
};
