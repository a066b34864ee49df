//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves to the first [`ShutdownSignal`] the
//! process receives; [`Supervisor::close_on_signal`] logs it and drains.
//!
//! | Platform | Signals |
//! |----------|---------|
//! | unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`, Ctrl-C |
//! | other    | Ctrl-C |
//!
//! [`Supervisor::close_on_signal`]: crate::Supervisor::close_on_signal

use std::fmt;

/// Signal that asked the service to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    CtrlC,
    Interrupt,
    Terminate,
    Quit,
}

impl ShutdownSignal {
    /// Conventional signal name, for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownSignal::CtrlC => "ctrl_c",
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Quit => "SIGQUIT",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Waits for a termination signal and reports which one arrived.
///
/// Listeners are registered per call; fails only if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            ShutdownSignal::CtrlC
        }
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
        _ = terminate.recv() => ShutdownSignal::Terminate,
        _ = quit.recv() => ShutdownSignal::Quit,
    };
    Ok(received)
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::CtrlC)
}
