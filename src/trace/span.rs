//! # Tracer contract.
//!
//! The crate does not implement a tracer. [`Tracer`] and [`Span`] describe what
//! a tracing backend must offer; [`NoopTracer`] is the default when a scope
//! carries none.

use std::fmt;
use std::sync::Arc;

/// Baggage/tag key carrying the client classification.
pub const CLIENT_TYPE_TAG: &str = "client-type";
/// Default client classification.
pub const CLIENT_TYPE_NORMAL: &str = "normal";
/// Classification used by canary callers.
pub const CLIENT_TYPE_CANARY: &str = "canary";

/// Value of a span tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Num(f64),
}

impl TagValue {
    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            TagValue::Num(_) => None,
        }
    }

    /// Returns the numeric payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Num(n) => Some(*n),
            TagValue::Str(_) => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Num(v)
    }
}

/// A single traced operation.
///
/// Spans are shared between the wrapper that finishes them and the scope that
/// exposes them to the body, so every method takes `&self`.
pub trait Span: Send + Sync {
    /// Identifier of the trace this span belongs to.
    fn trace_id(&self) -> u64;

    /// Identifier of this span.
    fn span_id(&self) -> u64;

    fn set_tag(&self, key: &str, value: TagValue);

    fn set_operation_name(&self, name: &str);

    /// Reads a baggage item propagated along the trace.
    fn baggage_item(&self, key: &str) -> Option<String>;

    fn set_baggage_item(&self, key: &str, value: &str);

    /// Finishes the span, optionally marking it as errored.
    ///
    /// Only the first call has an effect.
    fn finish(&self, error: Option<&str>);
}

/// Starts spans.
pub trait Tracer: Send + Sync {
    /// Starts a span named `operation`, continuing `parent`'s trace when given.
    fn start_span(&self, operation: &str, parent: Option<&dyn Span>) -> Arc<dyn Span>;
}

/// Reads the client classification from the span's baggage.
///
/// Returns [`CLIENT_TYPE_NORMAL`] when the item is absent or empty.
pub fn client_type_from_span(span: &dyn Span) -> String {
    span.baggage_item(CLIENT_TYPE_TAG)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| CLIENT_TYPE_NORMAL.to_string())
}

/// Tracer that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

/// Span produced by [`NoopTracer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpan;

impl Tracer for NoopTracer {
    fn start_span(&self, _operation: &str, _parent: Option<&dyn Span>) -> Arc<dyn Span> {
        Arc::new(NoopSpan)
    }
}

impl Span for NoopSpan {
    fn trace_id(&self) -> u64 {
        0
    }

    fn span_id(&self) -> u64 {
        0
    }

    fn set_tag(&self, _key: &str, _value: TagValue) {}

    fn set_operation_name(&self, _name: &str) {}

    fn baggage_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_baggage_item(&self, _key: &str, _value: &str) {}

    fn finish(&self, _error: Option<&str>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MockTracer;

    #[test]
    fn client_type_defaults_to_normal() {
        assert_eq!(client_type_from_span(&NoopSpan), CLIENT_TYPE_NORMAL);

        let tracer = MockTracer::new();
        let span = tracer.start_span("op", None);
        span.set_baggage_item(CLIENT_TYPE_TAG, "");
        assert_eq!(client_type_from_span(span.as_ref()), CLIENT_TYPE_NORMAL);

        span.set_baggage_item(CLIENT_TYPE_TAG, CLIENT_TYPE_CANARY);
        assert_eq!(client_type_from_span(span.as_ref()), CLIENT_TYPE_CANARY);
    }

    #[test]
    fn tag_value_accessors() {
        assert_eq!(TagValue::from("a").as_str(), Some("a"));
        assert_eq!(TagValue::from(2.0).as_f64(), Some(2.0));
        assert_eq!(TagValue::from(2.5).to_string(), "2.5");
    }
}
