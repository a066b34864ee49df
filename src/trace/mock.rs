//! # In-memory tracer for tests.
//!
//! [`MockTracer`] hands out spans that record tags and baggage, and keeps a
//! snapshot of every finished span. Children inherit the parent's trace id
//! and baggage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::span::{Span, TagValue, Tracer};

/// Snapshot of a finished span.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub operation_name: String,
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub tags: BTreeMap<String, TagValue>,
    pub baggage: BTreeMap<String, String>,
    /// Error the span was finished with.
    pub error: Option<String>,
}

impl FinishedSpan {
    /// Returns a tag by key.
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

#[derive(Default)]
struct Recorder {
    next_id: AtomicU64,
    finished: Mutex<Vec<FinishedSpan>>,
}

impl Recorder {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Tracer recording finished spans in memory.
#[derive(Clone, Default)]
pub struct MockTracer {
    recorder: Arc<Recorder>,
}

impl MockTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns finished spans in finishing order.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets all finished spans.
    pub fn reset(&self) {
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Tracer for MockTracer {
    fn start_span(&self, operation: &str, parent: Option<&dyn Span>) -> Arc<dyn Span> {
        let span_id = self.recorder.next_id();
        let (trace_id, parent_id) = match parent {
            Some(p) if p.trace_id() != 0 => (p.trace_id(), Some(p.span_id())),
            _ => (span_id, None),
        };
        let baggage = parent
            .map(|p| {
                // Baggage is not enumerable through the trait; a parent from this
                // tracer exposes the client classification only.
                let mut b = BTreeMap::new();
                if let Some(v) = p.baggage_item(crate::trace::CLIENT_TYPE_TAG) {
                    b.insert(crate::trace::CLIENT_TYPE_TAG.to_string(), v);
                }
                b
            })
            .unwrap_or_default();

        Arc::new(MockSpan {
            recorder: Arc::clone(&self.recorder),
            state: Mutex::new(SpanState {
                operation_name: operation.to_string(),
                tags: BTreeMap::new(),
                baggage,
            }),
            trace_id,
            span_id,
            parent_id,
            finished: AtomicBool::new(false),
        })
    }
}

struct SpanState {
    operation_name: String,
    tags: BTreeMap<String, TagValue>,
    baggage: BTreeMap<String, String>,
}

struct MockSpan {
    recorder: Arc<Recorder>,
    state: Mutex<SpanState>,
    trace_id: u64,
    span_id: u64,
    parent_id: Option<u64>,
    finished: AtomicBool,
}

impl MockSpan {
    fn state(&self) -> std::sync::MutexGuard<'_, SpanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Span for MockSpan {
    fn trace_id(&self) -> u64 {
        self.trace_id
    }

    fn span_id(&self) -> u64 {
        self.span_id
    }

    fn set_tag(&self, key: &str, value: TagValue) {
        self.state().tags.insert(key.to_string(), value);
    }

    fn set_operation_name(&self, name: &str) {
        self.state().operation_name = name.to_string();
    }

    fn baggage_item(&self, key: &str) -> Option<String> {
        self.state().baggage.get(key).cloned()
    }

    fn set_baggage_item(&self, key: &str, value: &str) {
        self.state()
            .baggage
            .insert(key.to_string(), value.to_string());
    }

    fn finish(&self, error: Option<&str>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let snapshot = {
            let st = self.state();
            FinishedSpan {
                operation_name: st.operation_name.clone(),
                trace_id: self.trace_id,
                span_id: self.span_id,
                parent_id: self.parent_id,
                tags: st.tags.clone(),
                baggage: st.baggage.clone(),
                error: error.map(str::to_string),
            }
        };
        self.recorder
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot);
    }
}
