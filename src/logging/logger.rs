//! # Scope-carried structured logger.
//!
//! A [`Logger`] is a cheap, clonable handle: a dot-joined name plus a set of
//! key/value fields. Deriving a logger (`named`, `with`) never mutates the
//! logger it was derived from.
//!
//! Outputs:
//! - `tracing` events (production); the keys in [`EVENT_FIELDS`] become event
//!   fields of their own, everything else is rendered into `extra`;
//! - an in-memory buffer shared with a [`MemoryLog`] (tests);
//! - nothing.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Level;

/// A record captured by a memory logger.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub logger: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Returns the value of a field by key.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keys emitted as dedicated `tracing` fields.
pub const EVENT_FIELDS: [&str; 5] = ["dd.trace_id", "dd.span_id", "error", "panic", "stacktrace"];

type Buffer = Arc<Mutex<Vec<LogRecord>>>;

#[derive(Clone)]
enum Output {
    Tracing,
    Memory(Buffer),
    Nop,
}

/// Reader side of [`Logger::memory`].
#[derive(Clone)]
pub struct MemoryLog {
    buffer: Buffer,
}

impl MemoryLog {
    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All records in emission order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    /// Records whose message equals `message`.
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.lock()
            .iter()
            .filter(|r| r.message == message)
            .cloned()
            .collect()
    }

    /// True if any record's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|r| r.message.contains(needle))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Structured logger handle.
#[derive(Clone)]
pub struct Logger {
    name: String,
    fields: Arc<Vec<(String, String)>>,
    output: Output,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Logger {
    fn with_output(output: Output) -> Self {
        Self {
            name: String::new(),
            fields: Arc::new(Vec::new()),
            output,
        }
    }

    /// Logger emitting `tracing` events.
    pub fn tracing() -> Self {
        Self::with_output(Output::Tracing)
    }

    /// Logger discarding everything.
    pub fn nop() -> Self {
        Self::with_output(Output::Nop)
    }

    /// Logger recording into memory, with its reader.
    pub fn memory() -> (Self, MemoryLog) {
        let buffer: Buffer = Arc::default();
        let log = MemoryLog {
            buffer: Arc::clone(&buffer),
        };
        (Self::with_output(Output::Memory(buffer)), log)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends `name` to the logger name, dot-separated.
    pub fn named(&self, name: &str) -> Self {
        let name = match (self.name.is_empty(), name.is_empty()) {
            (_, true) => self.name.clone(),
            (true, false) => name.to_string(),
            (false, false) => format!("{}.{}", self.name, name),
        };
        Self {
            name,
            fields: Arc::clone(&self.fields),
            output: self.output.clone(),
        }
    }

    /// Adds a field; a field with the same key is replaced.
    pub fn with(&self, key: &str, value: impl ToString) -> Self {
        let mut fields: Vec<(String, String)> = self
            .fields
            .iter()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect();
        fields.push((key.to_string(), value.to_string()));
        Self {
            name: self.name.clone(),
            fields: Arc::new(fields),
            output: self.output.clone(),
        }
    }

    /// Value of a field carried by the logger.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Emits `message` at `level` with the logger's fields plus `extra`.
    pub fn log(&self, level: Level, message: &str, extra: &[(&str, String)]) {
        match &self.output {
            Output::Nop => {}
            Output::Memory(buffer) => {
                let mut fields: Vec<(String, String)> = self.fields.as_ref().clone();
                for (k, v) in extra {
                    fields.retain(|(key, _)| key != k);
                    fields.push((k.to_string(), v.clone()));
                }
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(LogRecord {
                        level,
                        logger: self.name.clone(),
                        message: message.to_string(),
                        fields,
                    });
            }
            Output::Tracing => {
                let trace_id = self.value_of(extra, "dd.trace_id");
                let span_id = self.value_of(extra, "dd.span_id");
                let error = self.value_of(extra, "error");
                let panic = self.value_of(extra, "panic");
                let stacktrace = self.value_of(extra, "stacktrace");
                let rendered = self.render_fields(extra);
                let rest = (!rendered.is_empty()).then_some(rendered.as_str());
                let logger = self.name.as_str();

                macro_rules! emit {
                    ($level:expr) => {
                        tracing::event!(
                            $level,
                            logger,
                            dd.trace_id = trace_id,
                            dd.span_id = span_id,
                            error = error,
                            panic = panic,
                            stacktrace = stacktrace,
                            extra = rest,
                            "{message}"
                        )
                    };
                }
                match level {
                    Level::ERROR => emit!(Level::ERROR),
                    Level::WARN => emit!(Level::WARN),
                    Level::INFO => emit!(Level::INFO),
                    Level::DEBUG => emit!(Level::DEBUG),
                    Level::TRACE => emit!(Level::TRACE),
                }
            }
        }
    }

    /// Value of `key`, with `extra` taking precedence over carried fields.
    fn value_of<'a>(&'a self, extra: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        extra
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .or_else(|| self.field(key))
    }

    /// Renders the fields not in [`EVENT_FIELDS`] as `k=v` pairs.
    fn render_fields(&self, extra: &[(&str, String)]) -> String {
        let mut out = String::new();
        let carried = self
            .fields
            .iter()
            .filter(|(k, _)| !extra.iter().any(|(e, _)| e == k))
            .map(|(k, v)| (k.as_str(), v.as_str()));
        let extra = extra.iter().map(|(k, v)| (*k, v.as_str()));
        for (k, v) in carried.chain(extra) {
            if EVENT_FIELDS.contains(&k) {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{k}={v}");
        }
        out
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message, &[]);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message, &[]);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message, &[]);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message, &[]);
    }
}
