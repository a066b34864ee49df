//! Frame de-noising: build-root stripping, label shortening and panic
//! trampoline detection.

use serde::{Deserialize, Serialize};

/// One resolved frame, as reported by symbolication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl RawFrame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }
}

/// A rendered stack entry: `path:line` and the shortened function label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackElement {
    pub location: String,
    pub function: String,
}

fn is_rust_symbol(function: &str) -> bool {
    !function.contains('/') && (function.contains("::") || function.starts_with('<'))
}

/// Shortens a frame into `(path, line, label)`.
///
/// Slash-qualified labels (`pkg/sub.Type.Method`) keep the last
/// `count('/') + 2` path components and lose their package qualification.
/// Rust labels keep the path from the crate directory and lose their module
/// path.
pub fn parse_frame(file: &str, line: u32, function: &str) -> (String, u32, String) {
    if is_rust_symbol(function) {
        (rust_path(file), line, rust_label(function))
    } else {
        (slash_path(file, function), line, slash_label(function))
    }
}

fn slash_path(file: &str, function: &str) -> String {
    let keep = function.matches('/').count() + 2;
    let mut end = file.len();
    for _ in 0..keep {
        match file[..end].rfind('/') {
            Some(i) => end = i,
            None => return file.to_string(),
        }
    }
    file[end + 1..].to_string()
}

fn slash_label(function: &str) -> String {
    let tail = function.rsplit('/').next().unwrap_or(function);
    match tail.find('.') {
        Some(i) => tail[i + 1..].to_string(),
        None => tail.to_string(),
    }
}

fn rust_path(file: &str) -> String {
    let parts: Vec<&str> = file.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    let start = match parts.iter().rposition(|p| *p == "src") {
        Some(i) if i > 0 => i - 1,
        _ => parts.len().saturating_sub(2),
    };
    parts[start..].join("/")
}

fn rust_label(function: &str) -> String {
    if function.starts_with('<') {
        return function.to_string();
    }
    let segs: Vec<&str> = function.split("::").collect();
    if segs.len() < 2 {
        return function.to_string();
    }
    let last_fn = segs
        .iter()
        .rposition(|s| !s.starts_with("{{"))
        .unwrap_or(segs.len() - 1);

    let mut i = 1;
    while i < last_fn && segs[i].starts_with(|c: char| c.is_ascii_lowercase() || c == '_') {
        i += 1;
    }
    segs[i.min(last_fn)..].join("::")
}

/// True for frames that raise a panic rather than cause it.
pub(crate) fn is_trampoline(frame: &RawFrame, path: &str, label: &str) -> bool {
    let f = frame.function.as_str();
    if f.starts_with("core::panicking::") {
        return true;
    }
    if f.starts_with("std::panicking::") {
        return !(f.starts_with("std::panicking::try")
            || f.starts_with("std::panicking::r#try")
            || f.starts_with("std::panicking::catch_unwind"));
    }
    if f.starts_with("std::panic::panic_any") {
        return true;
    }
    path.starts_with("runtime/panic") && label == "gopanic"
}
