//! # Instrumented execution.
//!
//! [`run_instrumented`] wraps one unit of work with a span, a named logger and
//! a fresh [`MetricAccumulator`], then reports the outcome.
//!
//! ## Flow
//! ```text
//! scope ─► start span(name) ─► derive scope {span, logger, metrics, client type}
//!                                   │
//!                                   ▼
//!                          f(derived) under catch_unwind
//!                                   │
//!                 flush metrics → span + sink (always, once)
//!                                   │
//!        ┌──────────────┬───────────┴────────────────────────────┐
//!        ▼              ▼                                        ▼
//!      Ok(v)          Err(e)                                   panic
//!   finish(None)   log, finish(e)        tag error.message/error.stack/panic,
//!                  return Err(e)         log, finish("panic: .."), re-raise
//! ```
//!
//! ## Rules
//! - The wrapper never swallows a panic.
//! - The body's error is returned unchanged.

use std::fmt::Display;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use futures::FutureExt;
use tracing::Level;

use crate::metrics::MetricAccumulator;
use crate::scope::Scope;
use crate::stack::{
    StackCapture, install_panic_capture, panic_message, restore_panic_capture, take_panic_capture,
};
use crate::trace::{CLIENT_TYPE_TAG, TagValue};

/// Span type of instrumented calls.
pub const SPAN_TYPE_BACKGROUND: &str = "background";

/// Runs `f` as the traced, measured operation `name`.
///
/// `f` receives a scope carrying the new span, a logger named `name` with
/// `dd.trace_id`/`dd.span_id` fields and a fresh accumulator for `name`.
///
/// # Panics
/// Panics if `scope` carries no logger, and re-raises any panic of `f` after
/// reporting it.
pub async fn run_instrumented<F, Fut, T, E>(scope: &Scope, name: &str, f: F) -> Result<T, E>
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    install_panic_capture();

    let logger = scope.logger();
    let sink = scope.metrics_sink();
    let client_type = scope.client_type();
    let tracer = scope.tracer();

    let parent = scope.span();
    let span = tracer.start_span(name, parent.as_deref());
    span.set_tag("resource.name", TagValue::from(name));
    span.set_tag("span.type", TagValue::from(SPAN_TYPE_BACKGROUND));
    span.set_tag(CLIENT_TYPE_TAG, TagValue::from(client_type.as_str()));
    span.set_operation_name(name);

    let logger = logger
        .named(name)
        .with("dd.trace_id", span.trace_id())
        .with("dd.span_id", span.span_id());
    let metrics = Arc::new(MetricAccumulator::new(name));
    let inner = scope
        .with_span(Arc::clone(&span))
        .with_logger(logger.clone())
        .with_metrics(Arc::clone(&metrics))
        .with_client_type(client_type.clone());

    let outcome = AssertUnwindSafe(async move { f(inner).await })
        .catch_unwind()
        .await;

    metrics.copy_to_span(span.as_ref());
    metrics.copy_to_sink(sink.as_ref(), &client_type);

    match outcome {
        Ok(Ok(value)) => {
            span.finish(None);
            Ok(value)
        }
        Ok(Err(err)) => {
            let msg = err.to_string();
            logger.log(
                Level::DEBUG,
                "Instrumented call returned an error",
                &[("error", msg.clone())],
            );
            span.finish(Some(&msg));
            Err(err)
        }
        Err(payload) => {
            let raw = panic_message(payload.as_ref());
            // A payload re-raised with `resume_unwind` skips the hook and
            // leaves an older capture in the slot.
            let capture = take_panic_capture()
                .filter(|c| c.message() == raw)
                .unwrap_or_else(|| StackCapture::capture(0, false, raw.clone()));

            span.set_tag("error.message", TagValue::from(capture.message()));
            span.set_tag("error.stack", TagValue::from(capture.render()));
            span.set_tag("panic", TagValue::from(raw.as_str()));
            logger.log(
                Level::ERROR,
                "Panic in instrumented call",
                &[
                    ("panic", raw.clone()),
                    ("stacktrace", capture.to_json().to_string()),
                ],
            );
            span.finish(Some(&format!("panic: {raw}")));

            restore_panic_capture(Some(capture));
            resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::metrics::{RecordingSink, Unit};
    use crate::trace::MockTracer;

    fn test_scope() -> (Scope, MockTracer, Arc<RecordingSink>) {
        let tracer = MockTracer::new();
        let sink = Arc::new(RecordingSink::new());
        let scope = Scope::new()
            .with_logger(Logger::nop())
            .with_tracer(Arc::new(tracer.clone()))
            .with_metrics_sink(sink.clone());
        (scope, tracer, sink)
    }

    #[tokio::test]
    async fn error_finishes_span_and_is_returned() {
        let (scope, tracer, _) = test_scope();
        let (logger, log) = Logger::memory();
        let scope = scope.with_logger(logger.named("app"));

        let res: Result<(), String> = run_instrumented(&scope, "test1", |c| async move {
            assert!(c.span().is_some(), "no span");
            assert_eq!(c.logger().name(), "app.test1");
            Err("test err".to_string())
        })
        .await;
        assert_eq!(res, Err("test err".to_string()));

        let span0 = &tracer.finished_spans()[0];
        assert_eq!(span0.operation_name, "test1");
        assert_eq!(span0.error.as_deref(), Some("test err"));
        assert_eq!(span0.tag("resource.name"), Some(&TagValue::from("test1")));
        assert_eq!(span0.tag("span.type"), Some(&TagValue::from("background")));
        assert_eq!(span0.tag("client-type"), Some(&TagValue::from("normal")));

        let rec = &log.find("Instrumented call returned an error")[0];
        assert_eq!(rec.logger, "app.test1");
        assert_eq!(rec.field("error"), Some("test err"));
        assert_eq!(rec.field("dd.span_id"), Some(span0.span_id.to_string().as_str()));
    }

    async fn bad_panic(_: Scope) -> Result<(), String> {
        panic!("bad panic")
    }

    #[tokio::test]
    async fn panic_is_reported_and_reraised() {
        let (scope, tracer, _) = test_scope();

        let res = AssertUnwindSafe(run_instrumented(&scope, "test1", bad_panic))
            .catch_unwind()
            .await;
        let payload = res.expect_err("panic must propagate");
        assert_eq!(panic_message(payload.as_ref()), "bad panic");

        let span0 = &tracer.finished_spans()[0];
        assert_eq!(span0.operation_name, "test1");
        assert_eq!(span0.error.as_deref(), Some("panic: bad panic"));
        assert_eq!(span0.tag("panic"), Some(&TagValue::from("bad panic")));
        assert_eq!(span0.tag("error.message"), Some(&TagValue::from("bad panic")));

        let stack = span0.tag("error.stack").and_then(TagValue::as_str).unwrap_or_default();
        let first = stack.lines().next().unwrap_or_default();
        assert!(first.contains("runner.rs:"), "{stack}");
        assert!(first.contains("bad_panic"), "{stack}");
    }

    async fn reraise_after_handled_panic(_: Scope) -> Result<(), String> {
        let _ = std::panic::catch_unwind(|| -> () { panic!("handled earlier") });
        resume_unwind(Box::new("raised again".to_string()))
    }

    #[tokio::test]
    async fn stale_capture_is_not_reported() {
        let (scope, tracer, _) = test_scope();

        let res = AssertUnwindSafe(run_instrumented(&scope, "test1", reraise_after_handled_panic))
            .catch_unwind()
            .await;
        let payload = res.expect_err("panic must propagate");
        assert_eq!(panic_message(payload.as_ref()), "raised again");

        let span0 = &tracer.finished_spans()[0];
        assert_eq!(span0.tag("error.message"), Some(&TagValue::from("raised again")));
        assert_eq!(span0.error.as_deref(), Some("panic: raised again"));
        let stack = span0.tag("error.stack").and_then(TagValue::as_str).unwrap_or_default();
        assert!(!stack.is_empty());
    }

    #[tokio::test]
    async fn metrics_are_streamed_to_span_and_sink() {
        let (scope, tracer, sink) = test_scope();

        let res: Result<(), String> = run_instrumented(&scope, "test1", |c| async move {
            let met = c.metrics();
            met.add_count("hellocount", 1.0);
            met.add_metric("gigametric", 12.0, Unit::Gigabits);
            Ok(())
        })
        .await;
        assert!(res.is_ok());

        assert_eq!(sink.distribution_value("test1.hellocount"), Some(1.0));
        assert_eq!(
            sink.distribution_value("test1.gigametric"),
            Some(12.0 * 1024.0 * 1024.0 * 1024.0)
        );

        let span0 = &tracer.finished_spans()[0];
        assert_eq!(span0.error, None);
        assert_eq!(span0.tag("hellocount"), Some(&TagValue::Num(1.0)));
        assert_eq!(
            span0.tag("gigametric"),
            Some(&TagValue::Num(12.0 * 1024.0 * 1024.0 * 1024.0))
        );
        assert_eq!(span0.tag("gigametric_unit"), Some(&TagValue::from("bits")));
    }

    #[tokio::test]
    async fn nested_calls_continue_the_trace() {
        let (scope, tracer, sink) = test_scope();
        let scope = scope.with_client_type("canary");

        let res: Result<u32, String> = run_instrumented(&scope, "outer", |c| async move {
            run_instrumented(&c, "inner", |c| async move {
                assert_eq!(c.client_type(), "canary");
                Ok(7)
            })
            .await
        })
        .await;
        assert_eq!(res, Ok(7));

        let spans = tracer.finished_spans();
        assert_eq!(spans[0].operation_name, "inner");
        assert_eq!(spans[1].operation_name, "outer");
        assert_eq!(spans[0].trace_id, spans[1].trace_id);
        assert_eq!(spans[0].parent_id, Some(spans[1].span_id));
        assert_eq!(spans[0].tag("client-type"), Some(&TagValue::from("canary")));
        assert!(sink.names().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "trying to log from an un-imbued scope")]
    async fn unprimed_scope_is_fatal() {
        let _: Result<(), String> = run_instrumented(&Scope::new(), "x", |_| async { Ok(()) }).await;
    }
}
