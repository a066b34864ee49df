//! # Service setup and teardown.
//!
//! [`Visibility::setup`] wires the ambient collaborators of a service into a
//! root [`Scope`]:
//!
//! ```text
//! Config ──► logging::init(format, filter)          (once per process)
//!        ├─► Logger::tracing().named(service)
//!        ├─► NoopTracer                             (replace with with_tracer)
//!        └─► agent host set?  ── yes ─► install_statsd_exporter(host:port)
//!                             │         MetricsRecorderSink("<app>.", env/host tags)
//!                             └─ no  ─► NoopSink + info log
//! ```
//!
//! [`Visibility::with_logger`] builds the same scope without touching global
//! state: its recorder sink reports to whatever `metrics` recorder the caller
//! installed.

use std::sync::Arc;

use crate::core::Config;
use crate::logging::{self, InitError, Logger};
use crate::metrics::{MetricsRecorderSink, MetricsSink, NoopSink, install_statsd_exporter};
use crate::scope::Scope;
use crate::trace::{NoopTracer, Tracer};

/// Collaborators of a running service.
pub struct Visibility {
    scope: Scope,
    sink: Arc<dyn MetricsSink>,
}

impl Visibility {
    /// Installs logging and the DogStatsD exporter, then builds the root
    /// scope.
    ///
    /// A global subscriber installed earlier is kept; any other logging error
    /// is returned. An exporter that fails to install is logged and metrics
    /// keep flowing to the recorder already in place, if any.
    pub fn setup(config: &Config) -> Result<Self, InitError> {
        match logging::init(config.log_format, &config.log_filter) {
            Ok(()) | Err(InitError::Subscriber(_)) => {}
            Err(e) => return Err(e),
        }
        let vis = Self::with_logger(config, Logger::tracing());
        if let Some(addr) = config.statsd_addr() {
            if let Err(e) = install_statsd_exporter(&addr) {
                vis.scope.logger().log(
                    tracing::Level::WARN,
                    "Failed to install the metrics exporter",
                    &[("error", e.to_string()), ("error_kind", e.as_label().to_string())],
                );
            }
        }
        Ok(vis)
    }

    /// Builds the root scope around `logger` without touching global state.
    ///
    /// With an agent configured the sink forwards to the `metrics` facade;
    /// installing a recorder is left to the caller.
    pub fn with_logger(config: &Config, logger: Logger) -> Self {
        let logger = logger.named(&config.service_name());
        let sink: Arc<dyn MetricsSink> = match config.agent() {
            Some(host) => {
                logger.log(
                    tracing::Level::INFO,
                    "Metrics enabled",
                    &[
                        ("agent_host", host.to_string()),
                        ("statsd_addr", config.statsd_addr().unwrap_or_default()),
                    ],
                );
                Arc::new(MetricsRecorderSink::new(
                    format!("{}.", config.app_name),
                    config.global_tags(),
                ))
            }
            None => {
                logger.info("No DD_AGENT_HOST set, tracing and metrics are disabled");
                Arc::new(NoopSink)
            }
        };

        let scope = Scope::new()
            .with_logger(logger)
            .with_tracer(Arc::new(NoopTracer))
            .with_metrics_sink(Arc::clone(&sink));
        Self { scope, sink }
    }

    /// Replaces the tracer of the root scope.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.scope = self.scope.with_tracer(tracer);
        self
    }

    /// Root scope for supervisors and request handlers.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.sink)
    }

    /// Flushes the metrics sink.
    pub fn teardown(self) {
        if let Err(e) = self.sink.flush() {
            self.scope
                .logger()
                .log(tracing::Level::WARN, "Failed to flush metrics", &[("error", e.to_string())]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MockTracer;

    #[test]
    fn no_agent_means_noop_sink() {
        let (logger, log) = Logger::memory();
        let cfg = Config {
            app_name: "BillingApi".into(),
            ..Config::default()
        };
        let vis = Visibility::with_logger(&cfg, logger);

        assert_eq!(vis.scope().logger().name(), "billing-api");
        assert!(log.contains("No DD_AGENT_HOST set"));
        assert!(vis.sink().distribution("x", 1.0, &[]).is_ok());
        vis.teardown();
    }

    #[test]
    fn agent_enables_recorder_sink() {
        let (logger, log) = Logger::memory();
        let cfg = Config {
            agent_host: "localhost".into(),
            hostname: "h1".into(),
            ..Config::default()
        };
        let tracer = MockTracer::new();
        let vis = Visibility::with_logger(&cfg, logger).with_tracer(Arc::new(tracer.clone()));

        let rec = &log.find("Metrics enabled")[0];
        assert_eq!(rec.field("agent_host"), Some("localhost"));
        assert_eq!(rec.field("statsd_addr"), Some("localhost:8125"));

        vis.scope().tracer().start_span("op", None).finish(None);
        assert_eq!(tracer.finished_spans().len(), 1);
    }

    #[test]
    fn setup_with_agent_installs_the_exporter_once() {
        let cfg = Config {
            agent_host: "127.0.0.1".into(),
            ..Config::default()
        };
        let vis = Visibility::setup(&cfg).expect("first setup");
        assert!(vis.sink().distribution("startup", 1.0, &[]).is_ok());

        // The global recorder is taken now: a second setup only logs the failure.
        assert!(Visibility::setup(&cfg).is_ok());
        let err = install_statsd_exporter("127.0.0.1:8125").expect_err("recorder already set");
        assert_eq!(err.as_label(), "sink_install");
    }

    #[test]
    fn setup_tolerates_existing_subscriber() {
        let cfg = Config::default();
        assert!(Visibility::setup(&cfg).is_ok());
        assert!(Visibility::setup(&cfg).is_ok());
    }
}
