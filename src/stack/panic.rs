//! # Panic payloads and the capture hook.
//!
//! Rust unwinds before `catch_unwind` returns, so the panicking stack is only
//! observable from inside the panic hook. [`install_panic_capture`] chains a
//! hook that records a [`StackCapture`] into a thread-local slot; the code
//! that caught the panic then takes it with [`take_panic_capture`].
//!
//! ## Rules
//! - Installation happens once per process; later calls are no-ops.
//! - The previously installed hook still runs after the capture.
//! - The slot holds the latest capture of the current thread only.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Once;

use crate::stack::StackCapture;

static INSTALL: Once = Once::new();

thread_local! {
    static LAST_CAPTURE: RefCell<Option<StackCapture>> = const { RefCell::new(None) };
}

/// Normalizes a panic payload into a message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        return e.to_string();
    }
    if payload.is::<()>() {
        return "recovered from panic".to_string();
    }

    macro_rules! value_of {
        ($($t:ty),*) => {
            $(if payload.is::<$t>() {
                return format!("<{} Value>", stringify!($t));
            })*
        };
    }
    value_of!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

    "<unknown Value>".to_string()
}

/// Installs the chained capture hook.
pub fn install_panic_capture() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let capture = StackCapture::capture(0, true, panic_message(info.payload()));
            let _ = LAST_CAPTURE.try_with(|slot| *slot.borrow_mut() = Some(capture));
            previous(info);
        }));
    });
}

/// Takes the capture of the latest panic on this thread.
pub fn take_panic_capture() -> Option<StackCapture> {
    LAST_CAPTURE
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Puts a capture back, so that an outer handler re-raising the same panic
/// finds it.
pub fn restore_panic_capture(capture: Option<StackCapture>) {
    let _ = LAST_CAPTURE.try_with(|slot| *slot.borrow_mut() = capture);
}
