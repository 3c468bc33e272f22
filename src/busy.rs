//! # Busy / Interrupt Coordinator
//!
//! Converts an asynchronous external interrupt (Ctrl-C) into cooperative,
//! in-process signalling.
//!
//! ```text
//! SIGINT ──▶ signal trap task ──▶ BusyCoordinator::fire()
//!                                        │  most recent first
//!                                        ▼
//!                     ┌──────────────────────────────────┐
//!                     │ callback (run 2)  → token.interrupt()
//!                     │ callback (run 1)  → token.interrupt()
//!                     └──────────────────────────────────┘
//! ```
//!
//! [`BusyCoordinator::busy`] registers a callback for the duration of a
//! future. Unregistration happens in a drop guard, so it runs whether the
//! future completes, fails, panics or is cancelled. Registering the same
//! callback (same `Arc`) twice is idempotent: it fires once and stays
//! registered until the outermost block exits.
//!
//! One coordinator is constructed per process and shared through an `Arc`.
//! The OS signal handler is a thin adapter installed at most once per
//! coordinator by [`BusyCoordinator::install_signal_trap`].

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Callback fired when the process is interrupted.
pub type InterruptCallback = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    callback: InterruptCallback,
    refs: usize,
}

fn same_callback(a: &InterruptCallback, b: &InterruptCallback) -> bool {
    // Compare data pointers only; vtable pointers are not unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Process-wide registry of interrupt callbacks.
#[derive(Default)]
pub struct BusyCoordinator {
    registered: Mutex<Vec<Registration>>,
    trap_installed: AtomicBool,
    notice_shown: AtomicBool,
}

impl BusyCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Callbacks never run under the lock, so poisoning only happens if a
    // guard panics mid-update; the vector is still consistent then.
    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `work` with `callback` registered, unregistering it on every exit path.
    pub async fn busy<F, T>(&self, callback: InterruptCallback, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.register(callback);
        work.await
    }

    fn register(&self, callback: InterruptCallback) -> BusyGuard<'_> {
        let mut registered = self.registrations();
        match registered
            .iter_mut()
            .find(|r| same_callback(&r.callback, &callback))
        {
            Some(existing) => existing.refs += 1,
            None => registered.push(Registration {
                callback: Arc::clone(&callback),
                refs: 1,
            }),
        }
        debug!(registered = registered.len(), "busy block entered");

        BusyGuard {
            coordinator: self,
            callback,
        }
    }

    fn unregister(&self, callback: &InterruptCallback) {
        let mut registered = self.registrations();
        if let Some(pos) = registered
            .iter()
            .position(|r| same_callback(&r.callback, callback))
        {
            registered[pos].refs -= 1;
            if registered[pos].refs == 0 {
                registered.remove(pos);
            }
        }
        debug!(registered = registered.len(), "busy block exited");
    }

    /// Returns true while at least one busy block is active.
    pub fn is_busy(&self) -> bool {
        !self.registrations().is_empty()
    }

    /// Number of distinct registered callbacks.
    pub fn registered(&self) -> usize {
        self.registrations().len()
    }

    /// Fires every registered callback, most recently registered first.
    ///
    /// Returns the number of callbacks fired.
    pub fn fire(&self) -> usize {
        let snapshot: Vec<InterruptCallback> = self
            .registrations()
            .iter()
            .rev()
            .map(|r| Arc::clone(&r.callback))
            .collect();

        debug!(callbacks = snapshot.len(), "firing interrupt callbacks");
        for callback in &snapshot {
            callback();
        }
        snapshot.len()
    }

    /// Returns true exactly once per coordinator.
    ///
    /// Used to show the "waiting for cleanup" notice only on the first
    /// interrupt of the process.
    pub fn take_first_interrupt_notice(&self) -> bool {
        !self.notice_shown.swap(true, Ordering::SeqCst)
    }

    /// Spawns the task translating SIGINT into [`BusyCoordinator::fire`].
    ///
    /// Returns `Ok(false)` if the trap was already installed. Requires a
    /// running tokio runtime.
    pub fn install_signal_trap(self: &Arc<Self>) -> Result<bool> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("signal trap needs a tokio runtime: {}", e)))?;

        if self.trap_installed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let coordinator = Arc::clone(self);
        handle.spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to install interrupt handler");
                        return;
                    }
                };
                while sigint.recv().await.is_some() {
                    debug!("received SIGINT");
                    coordinator.fire();
                }
            }

            #[cfg(not(unix))]
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for interrupt");
                    return;
                }
                debug!("received Ctrl-C");
                coordinator.fire();
            }
        });

        debug!("interrupt signal trap installed");
        Ok(true)
    }
}

impl std::fmt::Debug for BusyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyCoordinator")
            .field("registered", &self.registered())
            .field("trap_installed", &self.trap_installed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Unregisters a busy callback when dropped.
struct BusyGuard<'a> {
    coordinator: &'a BusyCoordinator,
    callback: InterruptCallback,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.unregister(&self.callback);
    }
}
