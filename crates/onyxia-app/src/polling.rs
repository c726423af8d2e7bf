//! # Polling Controller
//!
//! Starts self-rescheduling refresh loops against the backend.
//!
//! ```text
//! start() ──► [cancelled?] ──► tick ──► [cancelled?] ──► select {
//!                 ▲                                        set_inactive / shutdown ─► stop
//!                 │                                        stop event ──────────────► stop
//!                 ├────────────────────────────────────── wake event
//!                 └────────────────────────────────────── sleep(next_delay())
//!                                                        }
//! ```
//!
//! ## Guarantees
//!
//! - Tick failures are logged and the loop keeps its schedule.
//! - Cancellation is checked before every tick and before re-arming, so a
//!   stopped loop never issues another backend call. A call already in
//!   flight completes; ticks consult their [`Cancellation`] before applying
//!   its result.
//! - Every [`PollingController::start`] call gets its own cancellation
//!   context. Nothing is deduplicated across calls; callers own their
//!   [`PollingHandle`] and call [`PollingHandle::set_inactive`] when done.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use onyxia_core::OnyxiaError;
use tokio::sync::watch;

use crate::events::{AppEvent, EventStream};
use crate::tasks::TaskRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Read side of a loop's cancellation context, handed to every tick.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Whether the loop has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the loop has been told to stop.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Write side of a loop's cancellation context.
#[derive(Debug, Clone)]
pub struct PollingHandle {
    cancel: Option<Arc<watch::Sender<bool>>>,
}

impl PollingHandle {
    /// A handle for a loop that was never started (feature disabled).
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stop the loop. Idempotent.
    pub fn set_inactive(&self) {
        if let Some(cancel) = &self.cancel {
            let was_cancelled = cancel.send_replace(true);
            if !was_cancelled {
                tracing::debug!("Polling loop set inactive");
            }
        }
    }

    /// Whether the loop is still scheduled.
    pub fn is_active(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| !*cancel.borrow())
    }

    /// Whether this handle controls a real loop.
    pub fn is_noop(&self) -> bool {
        self.cancel.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-entrancy guard
// ─────────────────────────────────────────────────────────────────────────────

/// Per-instance "update in flight" flag.
///
/// An update thunk entered while another run holds the flag is a no-op.
#[derive(Debug, Default)]
pub struct InFlight {
    running: AtomicBool,
}

impl InFlight {
    /// Claim the flag, or `None` if an update is already running.
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag: self })
    }

    /// Whether an update currently holds the flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the [`InFlight`] flag on drop, including on early return.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.running.store(false, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// External signals a loop reacts to.
#[derive(Debug, Default)]
pub struct PollingSignals {
    /// Any event on this stream stops the loop for good
    pub stop: Option<EventStream>,
    /// Any event on this stream triggers an immediate tick
    pub wake: Option<EventStream>,
}

impl PollingSignals {
    /// No external signals.
    pub fn none() -> Self {
        Self::default()
    }

    /// Stop on events from `stream`.
    #[must_use]
    pub fn stop_on(mut self, stream: EventStream) -> Self {
        self.stop = Some(stream);
        self
    }

    /// Tick early on events from `stream`.
    #[must_use]
    pub fn wake_on(mut self, stream: EventStream) -> Self {
        self.wake = Some(stream);
        self
    }
}

/// Spawns polling loops onto a shared [`TaskRegistry`].
#[derive(Debug, Clone)]
pub struct PollingController {
    tasks: Arc<TaskRegistry>,
}

impl PollingController {
    /// Create a controller spawning onto `tasks`.
    pub fn new(tasks: Arc<TaskRegistry>) -> Self {
        Self { tasks }
    }

    /// Start a loop. The first tick runs immediately.
    ///
    /// `next_delay` is evaluated after every tick, which lets a slice adapt
    /// its cadence to current state.
    pub fn start<T, Fut, D>(
        &self,
        name: &'static str,
        signals: PollingSignals,
        mut tick: T,
        mut next_delay: D,
    ) -> PollingHandle
    where
        T: FnMut(Cancellation) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), OnyxiaError>> + Send + 'static,
        D: FnMut() -> Duration + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let loop_cancel_tx = cancel_tx.clone();

        self.tasks.spawn_cancellable(async move {
            let PollingSignals { mut stop, mut wake } = signals;
            let mut cancel_rx = cancel_rx;
            tracing::debug!(poller = name, "Polling loop started");

            loop {
                if *cancel_rx.borrow() {
                    break;
                }

                if let Err(err) = tick(Cancellation { rx: cancel_rx.clone() }).await {
                    tracing::warn!(poller = name, error = %err, "Polling tick failed");
                }

                if *cancel_rx.borrow() {
                    break;
                }

                let delay = next_delay();
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::trace!(poller = name, delay_ms, "Next poll scheduled");

                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    Some(event) = next_event(&mut stop) => {
                        tracing::debug!(
                            poller = name,
                            usecase = event.usecase_name,
                            action = event.action_name,
                            "Polling loop stopped by event"
                        );
                        loop_cancel_tx.send_replace(true);
                        break;
                    }
                    Some(_) = next_event(&mut wake) => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            tracing::debug!(poller = name, "Polling loop stopped");
        });

        PollingHandle {
            cancel: Some(cancel_tx),
        }
    }
}

async fn next_event(stream: &mut Option<EventStream>) -> Option<AppEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
