//! # Runtime configuration.
//!
//! Provides [`Config`]: service identity, metrics agent location, logging
//! setup and the shutdown grace period.
//!
//! Config is used in two ways:
//! 1. **Setup**: `Visibility::setup(&config)` installs logging and picks a metrics sink
//! 2. **Supervision**: `Supervisor::with_config(&scope, config)` bounds `close_on_signal`
//!
//! ## Sentinel values
//! - `agent_host = ""` → no metrics agent (metrics go to a no-op sink); otherwise
//!   metrics are shipped to `agent_host:statsd_port` over DogStatsD
//! - `hostname = ""` → no `host:` tag
//! - `grace = 0s` → wait for processes forever

use std::time::Duration;

use crate::logging::{InitError, LogFormat};

/// Environment variable naming the metrics/tracing agent host.
pub const ENV_AGENT_HOST: &str = "DD_AGENT_HOST";
/// Environment variable with the agent's DogStatsD port.
pub const ENV_STATSD_PORT: &str = "DD_DOGSTATSD_PORT";
/// Environment variable naming the reporting host.
pub const ENV_HOSTNAME: &str = "DD_HOSTNAME";
/// Environment variable holding the log filter directives.
pub const ENV_LOG_FILTER: &str = "RUST_LOG";
/// Environment variable selecting the log format (`pretty` or `json`).
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
/// Environment variable with the application name.
pub const ENV_APP_NAME: &str = "APP_NAME";
/// Environment variable with the deployment environment name.
pub const ENV_ENV_NAME: &str = "APP_ENV";
/// Environment variable with the shutdown grace, in whole seconds.
pub const ENV_GRACE_SECS: &str = "SHUTDOWN_GRACE_SECS";

/// Global configuration.
///
/// ## Field semantics
/// - `app_name`: service name; metric namespace is `<app_name>.`
/// - `env_name`: deployment environment, tagged as `env:<env_name>`
/// - `agent_host`: metrics agent host (`""` = disabled)
/// - `statsd_port`: DogStatsD port of the agent
/// - `hostname`: reporting host, tagged as `host:<hostname>` (`""` = untagged)
/// - `log_format`: console output format
/// - `log_filter`: `EnvFilter` directives
/// - `grace`: maximum wait for processes on signal shutdown (`0s` = forever)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub env_name: String,
    pub agent_host: String,
    pub statsd_port: u16,
    pub hostname: String,
    pub log_format: LogFormat,
    pub log_filter: String,
    pub grace: Duration,
}

impl Config {
    /// Reads the configuration from the process environment; unset variables
    /// keep their defaults.
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InitError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_APP_NAME) {
            cfg.app_name = v;
        }
        if let Some(v) = lookup(ENV_ENV_NAME) {
            cfg.env_name = v;
        }
        if let Some(v) = lookup(ENV_AGENT_HOST) {
            cfg.agent_host = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_STATSD_PORT) {
            cfg.statsd_port = v.trim().parse().map_err(|_| InitError::Env {
                key: ENV_STATSD_PORT.to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup(ENV_HOSTNAME) {
            cfg.hostname = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_LOG_FORMAT) {
            cfg.log_format = v.parse()?;
        }
        if let Some(v) = lookup(ENV_LOG_FILTER) {
            cfg.log_filter = v;
        }
        if let Some(v) = lookup(ENV_GRACE_SECS) {
            let secs: u64 = v.trim().parse().map_err(|_| InitError::Env {
                key: ENV_GRACE_SECS.to_string(),
                value: v.clone(),
            })?;
            cfg.grace = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    /// Returns the agent host as an `Option`.
    #[inline]
    pub fn agent(&self) -> Option<&str> {
        if self.agent_host.is_empty() {
            None
        } else {
            Some(&self.agent_host)
        }
    }

    /// `host:port` of the agent's DogStatsD listener, if an agent is set.
    pub fn statsd_addr(&self) -> Option<String> {
        self.agent().map(|host| format!("{host}:{}", self.statsd_port))
    }

    /// Returns the reporting host as an `Option`.
    #[inline]
    pub fn host(&self) -> Option<&str> {
        if self.hostname.is_empty() {
            None
        } else {
            Some(&self.hostname)
        }
    }

    /// Returns the shutdown grace as an `Option`.
    ///
    /// - `None` → wait forever
    /// - `Some(d)` → bounded wait
    #[inline]
    pub fn grace_limit(&self) -> Option<Duration> {
        grace_limit(self.grace)
    }

    /// Service name: the app name snake-cased with `-`.
    pub fn service_name(&self) -> String {
        to_snake_case(&self.app_name, '-')
    }

    /// Global metric tags: `env:` and, when known, `host:`.
    pub fn global_tags(&self) -> Vec<String> {
        let mut tags = vec![format!("env:{}", self.env_name)];
        if let Some(host) = self.host() {
            tags.push(format!("host:{host}"));
        }
        tags
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `app_name = "app"`, `env_name = "dev"`
    /// - no agent host (DogStatsD port 8125), no hostname
    /// - `log_format = Pretty`, `log_filter = "info"`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            env_name: "dev".to_string(),
            agent_host: String::new(),
            statsd_port: 8125,
            hostname: String::new(),
            log_format: LogFormat::Pretty,
            log_filter: "info".to_string(),
            grace: Duration::from_secs(30),
        }
    }
}

/// `None` for the wait-forever sentinel `Duration::ZERO`.
pub(crate) fn grace_limit(grace: Duration) -> Option<Duration> {
    (!grace.is_zero()).then_some(grace)
}

/// `MyHTTPService` → `my-http-service` for `sep = '-'`.
fn to_snake_case(s: &str, sep: char) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary && !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
        }
        out.extend(c.to_lowercase());
    }
    while out.ends_with(sep) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn snake_cases_service_names() {
        assert_eq!(to_snake_case("MyService", '-'), "my-service");
        assert_eq!(to_snake_case("MyHTTPService", '-'), "my-http-service");
        assert_eq!(to_snake_case("billing_api v2", '-'), "billing-api-v2");
        assert_eq!(to_snake_case("already-snake", '-'), "already-snake");
    }

    #[test]
    fn sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.agent(), None);
        assert_eq!(cfg.statsd_addr(), None);
        assert_eq!(cfg.global_tags(), vec!["env:dev".to_string()]);
        assert_eq!(cfg.grace_limit(), Some(Duration::from_secs(30)));
        cfg.grace = Duration::ZERO;
        assert_eq!(cfg.grace_limit(), None);
        cfg.hostname = "h1".into();
        assert_eq!(cfg.global_tags(), vec!["env:dev".to_string(), "host:h1".to_string()]);
    }

    #[test]
    fn reads_environment_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_APP_NAME, "OrderWorker"),
            (ENV_AGENT_HOST, " localhost "),
            (ENV_LOG_FORMAT, "json"),
            (ENV_GRACE_SECS, "0"),
        ]);
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.service_name(), "order-worker");
        assert_eq!(cfg.agent(), Some("localhost"));
        assert_eq!(cfg.statsd_addr().as_deref(), Some("localhost:8125"));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.grace_limit(), None);
        assert_eq!(cfg.env_name, "dev");

        let bad = Config::from_lookup(|k| (k == ENV_GRACE_SECS).then(|| "soon".to_string()));
        assert_eq!(bad.unwrap_err().as_label(), "init_env");

        let port = Config::from_lookup(|k| match k {
            ENV_AGENT_HOST => Some("dd-agent".to_string()),
            ENV_STATSD_PORT => Some("9125".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(port.statsd_addr().as_deref(), Some("dd-agent:9125"));

        let bad_port = Config::from_lookup(|k| (k == ENV_STATSD_PORT).then(|| "x".to_string()));
        assert!(matches!(bad_port, Err(InitError::Env { key, .. }) if key == ENV_STATSD_PORT));
    }
}
