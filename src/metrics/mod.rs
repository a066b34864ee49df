//! Metric accumulation and export.
//!
//! - [`unit`]: [`Unit`] and normalization to canonical units;
//! - [`accumulator`]: [`MetricAccumulator`], [`MetricEntry`], [`TimeMeasurement`];
//! - [`sink`]: [`MetricsSink`] contract and implementations.

mod accumulator;
mod sink;
mod unit;

pub use accumulator::{MetricAccumulator, MetricEntry, TimeMeasurement};
pub use sink::{
    MetricsRecorderSink, MetricsSink, NoopSink, RecordingSink, SinkError, install_statsd_exporter,
};
pub use unit::Unit;
