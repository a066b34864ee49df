//! # Scope carrier.
//!
//! A [`Scope`] is an immutable chain of typed bindings threaded through every
//! call. It carries the ambient collaborators of a unit of work: logger,
//! metric accumulator, metrics sink, tracer, active span, client
//! classification and cancellation.
//!
//! ```text
//! root ── with_logger ── with_tracer ── with_span ── with_new_metrics
//!   ▲                                        │
//!   └── parent never sees child bindings ────┘
//! ```
//!
//! ## Rules
//! - `with_*` returns a new scope; the receiver is unchanged.
//! - Lookups walk from the newest binding to the root; the newest binding of a
//!   type wins.
//! - Fetching a logger or accumulator that was never bound is a fatal
//!   programmer error (`try_*` variants return the error instead).
//! - Missing sink/tracer fall back to no-op implementations; missing client
//!   classification is [`CLIENT_TYPE_NORMAL`].

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::FatalError;
use crate::logging::Logger;
use crate::metrics::{MetricAccumulator, MetricsSink, NoopSink};
use crate::trace::{CLIENT_TYPE_NORMAL, NoopTracer, Span, Tracer};

struct Node {
    parent: Option<Arc<Node>>,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Clone)]
struct SinkBinding(Arc<dyn MetricsSink>);

#[derive(Clone)]
struct TracerBinding(Arc<dyn Tracer>);

#[derive(Clone)]
struct SpanBinding(Arc<dyn Span>);

#[derive(Clone)]
struct ClientType(String);

#[derive(Clone)]
struct CancelBinding(CancellationToken);

/// Immutable chain of typed bindings.
#[derive(Clone)]
pub struct Scope {
    node: Arc<Node>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("logger", &self.try_logger().ok().map(|l| l.name().to_string()))
            .field("client_type", &self.client_type())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Scope {
    /// Empty root scope.
    pub fn new() -> Self {
        Self {
            node: Arc::new(Node {
                parent: None,
                value: None,
            }),
        }
    }

    /// Binds an arbitrary typed value.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        Self {
            node: Arc::new(Node {
                parent: Some(Arc::clone(&self.node)),
                value: Some(Arc::new(value)),
            }),
        }
    }

    /// Returns the newest binding of type `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        let mut node = Some(&self.node);
        while let Some(n) = node {
            if let Some(v) = n.value.as_deref().and_then(|v| v.downcast_ref::<T>()) {
                return Some(v);
            }
            node = n.parent.as_ref();
        }
        None
    }

    pub fn with_logger(&self, logger: Logger) -> Self {
        self.with_value(logger)
    }

    /// Returns the bound logger.
    ///
    /// # Panics
    /// Panics with [`FatalError::UnprimedLogger`] if none is bound.
    pub fn logger(&self) -> Logger {
        match self.try_logger() {
            Ok(l) => l,
            Err(e) => e.raise(),
        }
    }

    pub fn try_logger(&self) -> Result<Logger, FatalError> {
        self.value::<Logger>()
            .cloned()
            .ok_or(FatalError::UnprimedLogger)
    }

    pub fn with_metrics(&self, metrics: Arc<MetricAccumulator>) -> Self {
        self.with_value(metrics)
    }

    /// Binds a fresh accumulator for operation `op_name`.
    pub fn with_new_metrics(&self, op_name: &str) -> Self {
        self.with_metrics(Arc::new(MetricAccumulator::new(op_name)))
    }

    /// Returns the bound accumulator.
    ///
    /// # Panics
    /// Panics with [`FatalError::UnprimedMetrics`] if none is bound.
    pub fn metrics(&self) -> Arc<MetricAccumulator> {
        match self.try_metrics() {
            Ok(m) => m,
            Err(e) => e.raise(),
        }
    }

    pub fn try_metrics(&self) -> Result<Arc<MetricAccumulator>, FatalError> {
        self.value::<Arc<MetricAccumulator>>()
            .cloned()
            .ok_or(FatalError::UnprimedMetrics)
    }

    pub fn with_metrics_sink(&self, sink: Arc<dyn MetricsSink>) -> Self {
        self.with_value(SinkBinding(sink))
    }

    /// Returns the bound sink or a [`NoopSink`].
    pub fn metrics_sink(&self) -> Arc<dyn MetricsSink> {
        self.value::<SinkBinding>()
            .map(|b| Arc::clone(&b.0))
            .unwrap_or_else(|| Arc::new(NoopSink))
    }

    pub fn with_tracer(&self, tracer: Arc<dyn Tracer>) -> Self {
        self.with_value(TracerBinding(tracer))
    }

    /// Returns the bound tracer or a [`NoopTracer`].
    pub fn tracer(&self) -> Arc<dyn Tracer> {
        self.value::<TracerBinding>()
            .map(|b| Arc::clone(&b.0))
            .unwrap_or_else(|| Arc::new(NoopTracer))
    }

    pub fn with_span(&self, span: Arc<dyn Span>) -> Self {
        self.with_value(SpanBinding(span))
    }

    /// Active span, if any.
    pub fn span(&self) -> Option<Arc<dyn Span>> {
        self.value::<SpanBinding>().map(|b| Arc::clone(&b.0))
    }

    pub fn with_client_type(&self, client_type: impl Into<String>) -> Self {
        self.with_value(ClientType(client_type.into()))
    }

    /// Client classification, [`CLIENT_TYPE_NORMAL`] by default.
    pub fn client_type(&self) -> String {
        self.value::<ClientType>()
            .map(|c| c.0.clone())
            .unwrap_or_else(|| CLIENT_TYPE_NORMAL.to_string())
    }

    /// Binds a new cancellation token, child of the current one if any.
    pub fn with_cancel(&self) -> Self {
        let token = match self.cancel_token() {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        self.with_cancel_token(token)
    }

    pub fn with_cancel_token(&self, token: CancellationToken) -> Self {
        self.with_value(CancelBinding(token))
    }

    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.value::<CancelBinding>().map(|b| b.0.clone())
    }

    /// False when no token is bound.
    pub fn is_cancelled(&self) -> bool {
        self.value::<CancelBinding>()
            .is_some_and(|b| b.0.is_cancelled())
    }

    /// Completes when the bound token is cancelled; never completes without one.
    pub async fn cancelled(&self) {
        match self.cancel_token() {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::trace::MockTracer;

    #[test]
    fn parent_does_not_see_child_bindings() {
        let root = Scope::new().with_value(1u32);
        let child = root.with_value(2u32).with_value("tag");

        assert_eq!(root.value::<u32>(), Some(&1));
        assert_eq!(child.value::<u32>(), Some(&2));
        assert_eq!(child.value::<&str>(), Some(&"tag"));
        assert_eq!(root.value::<&str>(), None);
    }

    #[test]
    #[should_panic(expected = "trying to log from an un-imbued scope")]
    fn unprimed_logger_is_fatal() {
        Scope::new().logger();
    }

    #[test]
    fn try_accessors_report_missing_bindings() {
        let scope = Scope::new();
        assert_eq!(scope.try_logger().unwrap_err(), FatalError::UnprimedLogger);
        assert_eq!(scope.try_metrics().unwrap_err(), FatalError::UnprimedMetrics);

        let scope = scope.with_logger(Logger::nop().named("x")).with_new_metrics("op");
        assert_eq!(scope.logger().name(), "x");
        assert_eq!(scope.metrics().op_name(), "op");
    }

    #[test]
    fn defaults_for_optional_collaborators() {
        let scope = Scope::new();
        assert_eq!(scope.client_type(), CLIENT_TYPE_NORMAL);
        assert!(scope.span().is_none());
        assert!(scope.metrics_sink().distribution("x", 1.0, &[]).is_ok());
        assert_eq!(scope.tracer().start_span("op", None).trace_id(), 0);

        let sink = Arc::new(RecordingSink::new());
        let tracer = MockTracer::new();
        let scope = scope
            .with_metrics_sink(sink.clone())
            .with_tracer(Arc::new(tracer.clone()))
            .with_client_type("canary");
        scope.metrics_sink().distribution("x", 1.0, &[]).unwrap();
        assert_eq!(sink.distribution_value("x"), Some(1.0));
        assert_eq!(scope.client_type(), "canary");

        let span = scope.tracer().start_span("op", None);
        let scope = scope.with_span(span.clone());
        assert_eq!(scope.span().unwrap().span_id(), span.span_id());
    }

    #[tokio::test]
    async fn cancellation_flows_to_children() {
        let root = Scope::new().with_cancel();
        let child = root.with_cancel();
        assert!(!child.is_cancelled());
        assert!(!Scope::new().is_cancelled());

        root.cancel_token().unwrap().cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }
}
