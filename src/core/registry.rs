//! # Process registry.
//!
//! Tracks running processes by name and publishes the live count.
//!
//! ## Architecture
//! ```text
//! try_register(name) ──► lock ─► completion closed? / name taken? ─► insert ─► live = len
//! mark_done(name)    ──► lock ─► remove(name) ─► live = len ─► completion.close()
//! drain()            ──► live.subscribe().wait_for(0)
//! ```
//!
//! ## Rules
//! - Every mutation of the map and of the live count happens under one mutex.
//! - A completion is closed under the same lock that deregisters it, so a
//!   waiter never observes a closed completion for a still-registered name.
//! - Names are unique among running processes only.
//! - A closed completion is never registered again.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::core::process::Completion;
use crate::error::FatalError;

/// Registry of running processes.
pub(crate) struct Registry {
    running: Mutex<HashMap<String, Completion>>,
    live: watch::Sender<usize>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            running: Mutex::new(HashMap::new()),
            live,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Completion>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `name` with `completion`.
    ///
    /// Fails if `completion` belongs to a finished run or `name` is running.
    pub(crate) fn try_register(
        &self,
        name: &str,
        completion: &Completion,
    ) -> Result<(), FatalError> {
        let mut running = self.lock();
        if completion.is_done() {
            return Err(FatalError::ContextReused {
                name: name.to_string(),
            });
        }
        if running.contains_key(name) {
            return Err(FatalError::DuplicateProcess {
                name: name.to_string(),
            });
        }
        running.insert(name.to_string(), completion.clone());
        self.live.send_replace(running.len());
        Ok(())
    }

    /// Deregisters `name` and closes its completion.
    pub(crate) fn mark_done(&self, name: &str, completion: &Completion) {
        let mut running = self.lock();
        running.remove(name);
        self.live.send_replace(running.len());
        completion.close();
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Returns sorted names of running processes.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Completion of `name`, or an already-closed one if it is not running.
    pub(crate) fn wait_channel(&self, name: &str) -> Completion {
        self.lock()
            .get(name)
            .cloned()
            .unwrap_or_else(Completion::done)
    }

    /// Waits until no process is registered.
    pub(crate) async fn drain(&self) {
        let mut rx = self.live.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
