use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use visibility::{
    Logger, MockTracer, Process, ProcessError, RecordingSink, Scope, Supervisor, TagValue, Unit,
    instrument_with_metrics,
};

struct Uploader {
    done: mpsc::Sender<u32>,
}

#[async_trait]
impl Process for Uploader {
    async fn run(&self, scope: Scope) -> Result<(), ProcessError> {
        instrument_with_metrics(&scope, |s| async move {
            s.metrics().add_metric("Uploaded", 3.0, Unit::Megabytes);
            s.logger().info("upload finished");
            Ok::<(), ProcessError>(())
        })
        .await?;
        let _ = self.done.send(1).await;
        Ok(())
    }
}

#[tokio::test]
async fn named_process_reports_to_all_collaborators() {
    let tracer = MockTracer::new();
    let sink = Arc::new(RecordingSink::new());
    let (logger, log) = Logger::memory();
    let scope = Scope::new()
        .with_logger(logger.named("svc"))
        .with_tracer(Arc::new(tracer.clone()))
        .with_metrics_sink(sink.clone())
        .with_client_type("canary");

    let sup = Supervisor::new(&scope);
    let (tx, mut rx) = mpsc::channel(1);
    let pc = sup.create_process_context("uploader");
    pc.run(Uploader { done: tx });

    assert_eq!(rx.recv().await, Some(1));
    pc.wait().await;
    sup.close().await;

    assert_eq!(
        sink.distribution_value("uploader.Uploaded"),
        Some(3.0 * 1024.0 * 1024.0)
    );
    assert_eq!(
        sink.tags("uploader.Uploaded"),
        Some(vec!["unit:bytes".to_string(), "client-type:canary".to_string()])
    );
    assert_eq!(sink.distribution_value("uploader.Success"), Some(1.0));
    assert_eq!(sink.distribution_value("uploader.Fault"), Some(0.0));

    let span = &tracer.finished_spans()[0];
    assert_eq!(span.operation_name, "uploader");
    assert_eq!(span.tag("client-type"), Some(&TagValue::from("canary")));
    assert_eq!(span.tag("Uploaded_unit"), Some(&TagValue::from("bytes")));

    let rec = &log.find("upload finished")[0];
    assert_eq!(rec.logger, "svc.uploader");
    assert_eq!(rec.field("dd.trace_id"), Some(span.trace_id.to_string().as_str()));
    assert!(log.contains("Closing the process registry with 0 processes running"));
}

#[tokio::test]
async fn panicking_process_is_traced_and_released() {
    let tracer = MockTracer::new();
    let (logger, log) = Logger::memory();
    let scope = Scope::new()
        .with_logger(logger)
        .with_tracer(Arc::new(tracer.clone()));
    let sup = Supervisor::new(&scope);

    let pc = sup.create_process_context("crasher");
    pc.run(|_s: Scope| async {
        let v: Vec<u8> = Vec::new();
        if v.is_empty() {
            panic!("nothing to crash on");
        }
        Ok::<(), ProcessError>(())
    });

    pc.wait().await;
    assert!(!sup.has_process("crasher"));

    let span = &tracer.finished_spans()[0];
    assert_eq!(span.error.as_deref(), Some("panic: nothing to crash on"));
    assert_eq!(span.tag("panic"), Some(&TagValue::from("nothing to crash on")));
    let stack = span.tag("error.stack").and_then(TagValue::as_str).unwrap_or_default();
    assert!(stack.lines().next().unwrap_or_default().contains("supervisor_flow.rs:"), "{stack}");

    let rec = &log.find("Panic in instrumented call")[0];
    assert!(rec.field("stacktrace").is_some_and(|s| s.starts_with('[')));

    // The name can be reused once the crashed run is gone.
    let again = sup.create_process_context("crasher");
    assert!(again.try_run(|_s: Scope| async { Ok::<(), ProcessError>(()) }));
    again.wait().await;
    sup.close().await;
}

#[tokio::test]
async fn periodic_process_stops_on_close() {
    let sup = Supervisor::new(&Scope::new().with_logger(Logger::nop()));
    let (tx, mut rx) = mpsc::channel::<()>(8);

    let pc = sup.create_process_context("heartbeat");
    pc.run_periodic(Duration::from_millis(5), move |_s: Scope| {
        let tx = tx.clone();
        async move {
            let _ = tx.try_send(());
            Ok::<(), ProcessError>(())
        }
    });

    for _ in 0..3 {
        rx.recv().await.expect("tick");
    }
    assert_eq!(sup.log_running(), "heartbeat");

    sup.close().await;
    assert!(pc.completion().is_done());
    assert_eq!(sup.running_count(), 0);
}
