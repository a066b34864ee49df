//! # Per-operation metric accumulator.
//!
//! A [`MetricAccumulator`] collects measurements for one logical operation
//! (one instrumented call) and exports them, normalized, to a span and to a
//! [`MetricsSink`].
//!
//! ## Rules
//! - The first `add_metric` for a name fixes its unit; a later `add_metric`
//!   with another unit is a fatal programmer error.
//! - `set_metric` overwrites value **and** unit without checks.
//! - Export passes are read-only.
//! - The internal lock is never held while calling out to a span or sink
//!   implementation that could block for long; it is held only for map access
//!   and the export loop over already-owned data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use crate::error::FatalError;
use crate::metrics::{MetricsSink, Unit};
use crate::trace::{CLIENT_TYPE_TAG, Span, TagValue};

/// A single accumulated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricEntry {
    pub value: f64,
    pub unit: Unit,
    /// When the entry was created or last overwritten.
    pub timestamp: SystemTime,
}

impl MetricEntry {
    /// Converts the entry into the smallest canonical unit of its family.
    pub fn normalize(&self) -> (f64, Unit) {
        self.unit.normalize(self.value)
    }
}

/// Metrics of one operation, keyed by metric name.
#[derive(Debug)]
pub struct MetricAccumulator {
    op_name: String,
    metrics: Mutex<BTreeMap<String, MetricEntry>>,
}

impl MetricAccumulator {
    pub fn new(op_name: impl Into<String>) -> Self {
        Self {
            op_name: op_name.into(),
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// Name of the operation the metrics belong to.
    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MetricEntry>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `value` to the metric `name`.
    ///
    /// # Panics
    /// Panics with [`FatalError::UnitMismatch`] if `name` already carries a
    /// different unit.
    pub fn add_metric(&self, name: &str, value: f64, unit: Unit) {
        if let Err(e) = self.try_add_metric(name, value, unit) {
            e.raise();
        }
    }

    /// Non-raising form of [`add_metric`](Self::add_metric); the accumulator
    /// is left untouched on error.
    pub fn try_add_metric(&self, name: &str, value: f64, unit: Unit) -> Result<(), FatalError> {
        let mut metrics = self.lock();
        match metrics.get_mut(name) {
            None => {
                metrics.insert(
                    name.to_string(),
                    MetricEntry {
                        value,
                        unit,
                        timestamp: SystemTime::now(),
                    },
                );
                Ok(())
            }
            Some(entry) if entry.unit == unit => {
                entry.value += value;
                Ok(())
            }
            Some(entry) => Err(FatalError::UnitMismatch {
                name: name.to_string(),
                was: entry.unit,
                want: unit,
            }),
        }
    }

    /// Overwrites the metric `name`, unit included.
    pub fn set_metric(&self, name: &str, value: f64, unit: Unit) {
        self.lock().insert(
            name.to_string(),
            MetricEntry {
                value,
                unit,
                timestamp: SystemTime::now(),
            },
        );
    }

    pub fn add_count(&self, name: &str, value: f64) {
        self.add_metric(name, value, Unit::Count);
    }

    pub fn set_count(&self, name: &str, value: f64) {
        self.set_metric(name, value, Unit::Count);
    }

    /// Adds `duration` as seconds.
    pub fn add_duration(&self, name: &str, duration: Duration) {
        self.add_metric(name, duration.as_secs_f64(), Unit::Seconds);
    }

    /// Sets `duration` as seconds.
    pub fn set_duration(&self, name: &str, duration: Duration) {
        self.set_metric(name, duration.as_secs_f64(), Unit::Seconds);
    }

    /// Starts measuring wall-clock time for `name`.
    pub fn benchmark(self: &Arc<Self>, name: &str) -> TimeMeasurement {
        TimeMeasurement {
            parent: Arc::clone(self),
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Returns the raw value and unit, or `(0.0, Unit::None)` when absent.
    pub fn get_metric(&self, name: &str) -> (f64, Unit) {
        self.lock()
            .get(name)
            .map(|e| (e.value, e.unit))
            .unwrap_or((0.0, Unit::None))
    }

    pub fn get_metric_val(&self, name: &str) -> f64 {
        self.get_metric(name).0
    }

    /// Returns a copy of the entry, if present.
    pub fn entry(&self, name: &str) -> Option<MetricEntry> {
        self.lock().get(name).copied()
    }

    /// Removes all metrics.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn normalized(&self) -> Vec<(String, f64, Unit)> {
        self.lock()
            .iter()
            .map(|(name, entry)| {
                let (value, unit) = entry.normalize();
                (name.clone(), value, unit)
            })
            .collect()
    }

    /// Tags `span` with every normalized metric.
    ///
    /// A `<name>_unit` tag is added unless the unit is [`Unit::Count`].
    pub fn copy_to_span(&self, span: &dyn Span) {
        for (name, value, unit) in self.normalized() {
            span.set_tag(&name, TagValue::Num(value));
            if unit != Unit::Count {
                span.set_tag(&format!("{name}_unit"), TagValue::Str(unit.snake_name()));
            }
        }
    }

    /// Emits every normalized metric as a distribution `<op>.<name>` tagged
    /// with its unit and the client classification. Sink errors are ignored.
    pub fn copy_to_sink(&self, sink: &dyn MetricsSink, client_type: &str) {
        for (name, value, unit) in self.normalized() {
            let tags = [
                format!("unit:{}", unit.snake_name()),
                format!("{CLIENT_TYPE_TAG}:{client_type}"),
            ];
            let _ = sink.distribution(&format!("{}.{}", self.op_name, name), value, &tags);
        }
    }
}

/// Running wall-clock measurement created by [`MetricAccumulator::benchmark`].
#[derive(Debug)]
#[must_use = "call `done()` to record the measurement"]
pub struct TimeMeasurement {
    parent: Arc<MetricAccumulator>,
    name: String,
    start: Instant,
}

impl TimeMeasurement {
    /// Adds the elapsed time to the accumulator as a seconds metric.
    pub fn done(self) {
        if let Err(e) = self.try_done() {
            e.raise();
        }
    }

    /// Non-raising form of [`done`](Self::done).
    pub fn try_done(self) -> Result<(), FatalError> {
        self.parent
            .try_add_metric(&self.name, self.start.elapsed().as_secs_f64(), Unit::Seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::trace::{MockTracer, Tracer};

    #[test]
    fn accumulates_and_exports() {
        let m = Arc::new(MetricAccumulator::new("TestOp"));

        m.add_metric("zonk", 10.0, Unit::Count);

        m.set_count("count1", 11.0);
        m.set_count("count1", 12.0);
        m.add_count("count1", 2.0);

        m.set_metric("speed", 123.0, Unit::GigabitsPerSecond);
        m.add_metric("speed", 2.0, Unit::GigabitsPerSecond);

        m.set_duration("duration", Duration::from_millis(500));
        m.add_duration("duration", Duration::from_secs(2));

        let bench = m.benchmark("delay");
        std::thread::sleep(Duration::from_millis(50));
        bench.done();

        let sink = RecordingSink::new();
        m.copy_to_sink(&sink, "ThisClientType");

        assert_eq!(m.op_name(), "TestOp");
        assert_eq!(
            sink.tags("TestOp.duration").unwrap()[1],
            "client-type:ThisClientType"
        );
        assert_eq!(sink.distribution_value("TestOp.count1"), Some(14.0));
        assert!(sink.distribution_value("TestOp.delay").unwrap() >= 50_000.0);
        assert_eq!(sink.tags("TestOp.delay").unwrap()[0], "unit:microseconds");
        assert_eq!(sink.distribution_value("TestOp.duration"), Some(2.5e6));
        assert_eq!(
            sink.distribution_value("TestOp.speed"),
            Some(125.0 * 1024.0 * 1024.0 * 1024.0)
        );
        assert_eq!(sink.tags("TestOp.speed").unwrap()[0], "unit:bits_per_second");
        assert_eq!(sink.distribution_value("TestOp.zonk"), Some(10.0));

        assert_eq!(m.get_metric("zonk"), (10.0, Unit::Count));
        assert_eq!(m.get_metric_val("zonk"), 10.0);
        assert_eq!(m.get_metric_val("badbad"), 0.0);

        m.reset();
        m.reset();
        assert_eq!(m.get_metric("zonk"), (0.0, Unit::None));
    }

    #[test]
    #[should_panic(expected = "inconsistent unit assignment")]
    fn unit_mismatch_is_fatal() {
        let m = MetricAccumulator::new("op");
        m.add_metric("x", 1.0, Unit::Bytes);
        m.add_metric("x", 1.0, Unit::Bits);
    }

    #[test]
    fn try_add_metric_reports_mismatch_without_side_effects() {
        let m = MetricAccumulator::new("op");
        m.add_metric("x", 1.0, Unit::Bytes);
        let err = m.try_add_metric("x", 5.0, Unit::Kilobytes).unwrap_err();
        assert_eq!(err.as_label(), "fatal_unit_mismatch");
        assert_eq!(m.get_metric("x"), (1.0, Unit::Bytes));

        // set_metric may change the unit.
        m.set_metric("x", 3.0, Unit::Kilobytes);
        m.add_metric("x", 1.0, Unit::Kilobytes);
        assert_eq!(m.get_metric("x"), (4.0, Unit::Kilobytes));
    }

    #[test]
    fn span_export_tags_units_except_counts() {
        let m = MetricAccumulator::new("TestCtx");
        for i in 0..17 {
            m.add_count(&format!("count{i}"), 2.0);
            m.add_metric(&format!("met{i}"), i as f64, Unit::Bytes);
        }

        let tracer = MockTracer::new();
        let span = tracer.start_span("TestCtx", None);
        m.copy_to_span(span.as_ref());
        span.finish(None);

        let finished = &tracer.finished_spans()[0];
        for i in 0..17 {
            assert_eq!(
                finished.tag(&format!("count{i}")),
                Some(&TagValue::Num(2.0))
            );
            assert_eq!(finished.tag(&format!("count{i}_unit")), None);
            assert_eq!(
                finished.tag(&format!("met{i}")),
                Some(&TagValue::Num(i as f64))
            );
            assert_eq!(
                finished.tag(&format!("met{i}_unit")),
                Some(&TagValue::Str("bytes".into()))
            );
        }
    }

    #[test]
    fn entry_normalizes() {
        let m = MetricAccumulator::new("op");
        m.set_metric("size", 2.0, Unit::Kilobytes);
        assert_eq!(m.entry("size").unwrap().normalize(), (2048.0, Unit::Bytes));
        assert!(m.entry("missing").is_none());
    }
}
