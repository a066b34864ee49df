//! # Shortened stack captures.
//!
//! A [`StackCapture`] records raw instruction pointers at capture time and
//! resolves them lazily, once, on first rendering.
//!
//! ## Rendering
//! ```text
//! raw frames ──► drop capture machinery ──► skip N ──► panic suppression ──► parse_frame
//!                                                        │
//!                       (skip_to_first_panic) count trampolines, hide frames
//!                       until that many trampolines were consumed
//! ```
//!
//! The first rendered line is the innermost frame that caused the panic, not
//! the handlers that re-raised it.

use std::fmt;
use std::sync::OnceLock;

use crate::stack::frame::{RawFrame, StackElement, is_trampoline, parse_frame};

/// Maximum number of rendered frames.
pub const MAX_FRAMES: usize = 40;

/// Extra raw frames collected to make room for hook and unwinder frames.
const MACHINERY_FRAMES: usize = 24;

const UNKNOWN: &str = "<unknown>";

/// Captured stack with its panic message.
#[derive(Clone, Debug)]
pub struct StackCapture {
    ips: Vec<usize>,
    skip_frames: usize,
    skip_to_first_panic: bool,
    message: String,
    resolved: OnceLock<Vec<RawFrame>>,
}

impl StackCapture {
    /// Captures the current stack, skipping `skip_frames` frames above the
    /// caller.
    ///
    /// With `skip_to_first_panic`, rendering starts at the frame that raised
    /// the first panic.
    pub fn capture(skip_frames: usize, skip_to_first_panic: bool, message: impl Into<String>) -> Self {
        let limit = MAX_FRAMES + MACHINERY_FRAMES + skip_frames;
        let mut ips = Vec::with_capacity(limit);
        backtrace::trace(|frame| {
            ips.push(frame.ip() as usize);
            ips.len() < limit
        });
        Self {
            ips,
            skip_frames,
            skip_to_first_panic,
            message: message.into(),
            resolved: OnceLock::new(),
        }
    }

    /// Builds a capture over already-resolved frames, innermost first.
    pub fn from_frames(frames: Vec<RawFrame>, skip_to_first_panic: bool, message: impl Into<String>) -> Self {
        Self {
            ips: Vec::new(),
            skip_frames: 0,
            skip_to_first_panic,
            message: message.into(),
            resolved: OnceLock::from(frames),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Resolved frames, capture machinery and skipped frames removed.
    pub fn frames(&self) -> &[RawFrame] {
        self.resolved.get_or_init(|| {
            let mut frames = resolve(&self.ips);
            let start = machinery_len(&frames);
            frames.drain(..start.min(frames.len()));
            frames.drain(..self.skip_frames.min(frames.len()));
            frames
        })
    }

    fn elements(&self) -> impl Iterator<Item = (String, u32, String)> + '_ {
        let frames = self.frames();
        let mut panics_to_skip = if self.skip_to_first_panic {
            frames
                .iter()
                .filter(|f| {
                    let (path, _, label) = parse_frame(&f.file, f.line, &f.function);
                    is_trampoline(f, &path, &label)
                })
                .count()
        } else {
            0
        };

        frames
            .iter()
            .filter_map(move |f| {
                let (path, line, label) = parse_frame(&f.file, f.line, &f.function);
                if panics_to_skip > 0 {
                    if is_trampoline(f, &path, &label) {
                        panics_to_skip -= 1;
                    }
                    return None;
                }
                Some((path, line, label))
            })
            .take(MAX_FRAMES)
    }

    /// Structured form, one element per frame.
    pub fn to_structured(&self) -> Vec<StackElement> {
        self.elements()
            .map(|(path, line, label)| StackElement {
                location: format!("{path}:{line}"),
                function: label,
            })
            .collect()
    }

    /// One `path:line label` line per frame.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, line, label) in self.elements() {
            out.push_str(&format!("{path}:{line} {label}\n"));
        }
        out
    }

    /// Structured form as a JSON array, for log fields.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.to_structured()).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for StackCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StackCapture {}

fn resolve(ips: &[usize]) -> Vec<RawFrame> {
    let mut frames = Vec::with_capacity(ips.len());
    for &ip in ips {
        let before = frames.len();
        backtrace::resolve(ip as *mut std::ffi::c_void, |symbol| {
            frames.push(RawFrame {
                file: symbol
                    .filename()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                line: symbol.lineno().unwrap_or(0),
                function: symbol
                    .name()
                    .map(|n| format!("{n:#}"))
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            });
        });
        if frames.len() == before {
            frames.push(RawFrame::new(UNKNOWN, 0, UNKNOWN));
        }
    }
    frames
}

/// Number of leading frames belonging to the unwinder and to `capture`.
fn machinery_len(frames: &[RawFrame]) -> usize {
    let own = frames.iter().take(MACHINERY_FRAMES).position(|f| {
        f.function
            .trim_end_matches("::{{closure}}")
            .ends_with("StackCapture::capture")
    });
    match own {
        Some(i) => i + 1,
        None => frames
            .iter()
            .take_while(|f| f.function.starts_with("backtrace::") || f.function.starts_with("_Unwind"))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go_frame(file: &str, line: u32, function: &str) -> RawFrame {
        RawFrame::new(file, line, function)
    }

    #[test]
    fn renders_slash_qualified_frames() {
        let st = StackCapture::from_frames(
            vec![
                go_frame("/home/user/src/pkg/sub/file.go", 12, "pkg/sub.Type.Method"),
                go_frame("/home/user/src/pkg/main.go", 5, "pkg.main"),
            ],
            false,
            "Hello",
        );
        assert_eq!(st.render(), "pkg/sub/file.go:12 Type.Method\npkg/main.go:5 main\n");
        assert_eq!(st.to_string(), "Hello");
        assert_eq!(
            st.to_structured()[0],
            StackElement {
                location: "pkg/sub/file.go:12".into(),
                function: "Type.Method".into()
            }
        );
    }

    #[test]
    fn nested_reraises_start_at_the_original_panic() {
        let panic_frame = || go_frame("/usr/local/go/src/runtime/panic.go", 965, "runtime.gopanic");
        let frames = vec![
            panic_frame(),
            go_frame("/src/app/handler.go", 30, "app.Handler.func2"),
            panic_frame(),
            go_frame("/src/app/handler.go", 25, "app.Handler.func1"),
            panic_frame(),
            go_frame("/src/app/handler.go", 40, "app.Handler"),
            go_frame("/src/app/main.go", 10, "app.main"),
        ];

        let st = StackCapture::from_frames(frames.clone(), true, "Hello");
        let lines: Vec<String> = st.render().lines().map(str::to_string).collect();
        assert_eq!(lines, vec!["app/handler.go:40 Handler", "app/main.go:10 main"]);

        let full = StackCapture::from_frames(frames, false, "Hello");
        assert_eq!(full.to_structured().len(), 7);
    }

    #[test]
    fn rust_panic_machinery_is_suppressed() {
        let st = StackCapture::from_frames(
            vec![
                RawFrame::new("/rustc/abc/library/std/src/panicking.rs", 800, "std::panicking::rust_panic_with_hook"),
                RawFrame::new("/rustc/abc/library/core/src/panicking.rs", 75, "core::panicking::panic_fmt"),
                RawFrame::new("/home/u/myapp/src/worker.rs", 42, "myapp::worker::Poller::tick"),
                RawFrame::new("/rustc/abc/library/std/src/panicking.rs", 550, "std::panicking::try::do_call"),
                RawFrame::new("/home/u/myapp/src/main.rs", 7, "myapp::main"),
            ],
            true,
            "boom",
        );
        let json = st.to_json();
        assert_eq!(json[0]["location"], "myapp/src/worker.rs:42");
        assert_eq!(json[0]["function"], "Poller::tick");
        assert_eq!(json.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn no_trampolines_keeps_everything() {
        let st = StackCapture::from_frames(vec![RawFrame::new("/a/src/b.rs", 1, "a::b")], true, "");
        assert_eq!(st.render(), "a/src/b.rs:1 b\n");
        assert!(StackCapture::from_frames(Vec::new(), true, "x").render().is_empty());
    }

    #[test]
    fn rendering_is_capped() {
        let frames = (0..100)
            .map(|i| RawFrame::new("/a/src/b.rs", i, "a::f"))
            .collect();
        let st = StackCapture::from_frames(frames, false, "");
        assert_eq!(st.to_structured().len(), MAX_FRAMES);
    }

    #[inline(never)]
    fn capture_here() -> StackCapture {
        StackCapture::capture(0, false, "Hello")
    }

    #[test]
    fn live_capture_starts_at_caller() {
        let st = capture_here();
        let first = &st.to_structured()[0];
        assert_eq!(first.function, "capture_here");
        assert!(first.location.contains("capture.rs:"), "{}", first.location);

        let skipped = StackCapture::capture(0, false, "Hello");
        assert_eq!(skipped.to_structured()[0].function, "live_capture_starts_at_caller");
    }
}
