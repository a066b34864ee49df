//! # Metrics sink contract.
//!
//! A [`MetricsSink`] receives one distribution sample per normalized metric
//! when an instrumented call finishes. Delivery is best-effort: callers ignore
//! the returned [`SinkError`].
//!
//! Implementations:
//! - [`NoopSink`]: default when a scope carries no sink;
//! - [`RecordingSink`]: keeps the last sample per name (tests);
//! - [`MetricsRecorderSink`]: forwards to the `metrics` facade as histograms;
//!   [`install_statsd_exporter`] installs the facade's DogStatsD exporter.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use metrics_exporter_dogstatsd::DogStatsDBuilder;
use thiserror::Error;

/// Errors reported by a sink.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SinkError {
    /// The backend refused or failed to accept the sample.
    #[error("metrics backend error: {0}")]
    Backend(String),

    /// The exporter for `addr` could not be installed.
    #[error("failed to install metrics exporter for {addr}: {reason}")]
    Install { addr: String, reason: String },
}

impl SinkError {
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Backend(_) => "sink_backend",
            SinkError::Install { .. } => "sink_install",
        }
    }
}

/// Destination for distribution samples.
pub trait MetricsSink: Send + Sync {
    /// Emits a distribution sample `value` under `name`, tagged with
    /// `key:value` strings.
    fn distribution(&self, name: &str, value: f64, tags: &[String]) -> Result<(), SinkError>;

    /// Flushes buffered samples.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink dropping every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn distribution(&self, _name: &str, _value: f64, _tags: &[String]) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Default)]
struct Recorded {
    distributions: HashMap<String, f64>,
    tags: HashMap<String, Vec<String>>,
}

/// Sink remembering the last sample and tags per metric name.
#[derive(Default)]
pub struct RecordingSink {
    inner: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value recorded under `name`.
    pub fn distribution_value(&self, name: &str) -> Option<f64> {
        self.lock().distributions.get(name).copied()
    }

    /// Tags recorded with the last sample under `name`.
    pub fn tags(&self, name: &str) -> Option<Vec<String>> {
        self.lock().tags.get(name).cloned()
    }

    /// Sorted names of all recorded distributions.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().distributions.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.distributions.clear();
        inner.tags.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for RecordingSink {
    fn distribution(&self, name: &str, value: f64, tags: &[String]) -> Result<(), SinkError> {
        let mut inner = self.lock();
        inner.distributions.insert(name.to_string(), value);
        inner.tags.insert(name.to_string(), tags.to_vec());
        Ok(())
    }
}

/// Sink forwarding samples to the global `metrics` recorder as histograms.
///
/// Names are prefixed with `namespace`; `key:value` tags become labels and are
/// merged with the sink-wide `global_tags`. Samples reach whatever recorder is
/// installed globally, see [`install_statsd_exporter`].
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderSink {
    namespace: String,
    global_tags: Vec<String>,
}

impl MetricsRecorderSink {
    pub fn new(namespace: impl Into<String>, global_tags: Vec<String>) -> Self {
        Self {
            namespace: namespace.into(),
            global_tags,
        }
    }

    fn labels(&self, tags: &[String]) -> Vec<metrics::Label> {
        self.global_tags
            .iter()
            .chain(tags.iter())
            .map(|tag| match tag.split_once(':') {
                Some((k, v)) => metrics::Label::new(k.to_string(), v.to_string()),
                None => metrics::Label::new(tag.clone(), String::new()),
            })
            .collect()
    }
}

impl MetricsSink for MetricsRecorderSink {
    fn distribution(&self, name: &str, value: f64, tags: &[String]) -> Result<(), SinkError> {
        let full_name = format!("{}{}", self.namespace, name);
        let labels = self.labels(tags);
        metrics::histogram!(full_name, labels).record(value);
        Ok(())
    }
}

/// Installs the global `metrics` recorder shipping to a DogStatsD agent at
/// `addr` (`host:port`).
///
/// Fails if the address is invalid or a global recorder is already installed.
pub fn install_statsd_exporter(addr: &str) -> Result<(), SinkError> {
    let install = |reason: String| SinkError::Install {
        addr: addr.to_string(),
        reason,
    };
    DogStatsDBuilder::default()
        .with_remote_address(addr)
        .map_err(|e| install(e.to_string()))?
        .install()
        .map_err(|e| install(e.to_string()))
}
