//! Structured logging.
//!
//! - [`logger`]: the scope-carried [`Logger`] and its in-memory reader;
//! - [`init`]: global `tracing-subscriber` installation.

mod init;
mod logger;

pub use init::{InitError, LogFormat, init};
pub use logger::{EVENT_FIELDS, LogRecord, Logger, MemoryLog};
