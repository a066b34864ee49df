//! Stack capture and de-noising.
//!
//! - [`frame`]: frame parsing and [`StackElement`];
//! - [`capture`]: [`StackCapture`];
//! - [`panic`]: payload normalization and the capture hook.

mod capture;
mod frame;
mod panic;

pub use capture::{MAX_FRAMES, StackCapture};
pub use frame::{RawFrame, StackElement, parse_frame};
pub use panic::{install_panic_capture, panic_message, restore_panic_capture, take_panic_capture};
