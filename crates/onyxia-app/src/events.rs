//! # Cross-Slice Event Bus
//!
//! A single append-only stream of `{usecase_name, action_name, payload}`
//! events. The store enqueues one event per dispatched action; slices may
//! also publish *derived* events on their own named channels.
//!
//! ## Delivery guarantees
//!
//! - Events reach every subscriber in enqueue order.
//! - A subscriber only sees events enqueued after it attached (sequence
//!   watermark), even when earlier events are still waiting in the queue.
//! - A listener that panics is logged and skipped; other listeners still
//!   receive the event.
//! - Publishing from inside a listener is allowed: the nested event is
//!   queued and delivered once the current event has reached every listener.
//!
//! Two subscription styles are offered:
//!
//! - [`EventBus::listen`]: synchronous callbacks, run on the publishing task
//! - [`EventBus::subscribe`]: an async [`EventStream`] backed by a tokio
//!   broadcast channel, used by polling loops for wake/stop signals
//!
//! Each bus is an independent instance; there is no process-wide singleton.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use crate::store::Slice;

/// Default broadcast buffer for async subscribers.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the event stream.
#[derive(Clone)]
pub struct AppEvent {
    /// Position in the stream, strictly increasing
    pub seq: u64,
    /// Slice (or derived channel owner) that produced the event
    pub usecase_name: &'static str,
    /// Action name, or derived channel name
    pub action_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl AppEvent {
    /// Downcast the payload.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// The dispatched action, when this event mirrors an action of `S`.
    pub fn action<S: Slice>(&self) -> Option<&S::Action> {
        if self.usecase_name == S::NAME {
            self.payload::<S::Action>()
        } else {
            None
        }
    }

    /// Whether this event has the given origin.
    pub fn is(&self, usecase_name: &str, action_name: &str) -> bool {
        self.usecase_name == usecase_name && self.action_name == action_name
    }
}

impl fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEvent")
            .field("seq", &self.seq)
            .field("usecase_name", &self.usecase_name)
            .field("action_name", &self.action_name)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

type EventPredicate = Arc<dyn Fn(&AppEvent) -> bool + Send + Sync>;

/// Selects events by `(usecase_name, action_name)`.
///
/// An empty filter matches everything. Several keys are OR-ed. An optional
/// payload predicate is AND-ed on top.
#[derive(Clone, Default)]
pub struct EventFilter {
    keys: Vec<(&'static str, Option<&'static str>)>,
    predicate: Option<EventPredicate>,
}

impl EventFilter {
    /// Match every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match every action of one usecase.
    pub fn usecase(usecase_name: &'static str) -> Self {
        Self {
            keys: vec![(usecase_name, None)],
            predicate: None,
        }
    }

    /// Match one action of one usecase.
    pub fn action(usecase_name: &'static str, action_name: &'static str) -> Self {
        Self {
            keys: vec![(usecase_name, Some(action_name))],
            predicate: None,
        }
    }

    /// Also match another action.
    #[must_use]
    pub fn or_action(mut self, usecase_name: &'static str, action_name: &'static str) -> Self {
        self.keys.push((usecase_name, Some(action_name)));
        self
    }

    /// Additionally require `predicate` to hold.
    #[must_use]
    pub fn where_event<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AppEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `event` passes the filter.
    pub fn matches(&self, event: &AppEvent) -> bool {
        let key_match = self.keys.is_empty()
            || self.keys.iter().any(|(usecase, action)| {
                *usecase == event.usecase_name && action.map_or(true, |a| a == event.action_name)
            });
        key_match && self.predicate.as_ref().map_or(true, |p| p(event))
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("keys", &self.keys)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus
// ─────────────────────────────────────────────────────────────────────────────

struct Listener {
    id: u64,
    filter: EventFilter,
    from_seq: u64,
    callback: Box<dyn Fn(&AppEvent) + Send + Sync>,
}

#[derive(Default)]
struct Queue {
    next_seq: u64,
    pending: VecDeque<AppEvent>,
}

struct BusInner {
    queue: Mutex<Queue>,
    delivering: AtomicBool,
    listeners: RwLock<Vec<Arc<Listener>>>,
    next_listener_id: AtomicU64,
    sender: broadcast::Sender<AppEvent>,
}

/// Publish/subscribe channel shared by every slice of one store.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose async subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                queue: Mutex::new(Queue::default()),
                delivering: AtomicBool::new(false),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                sender,
            }),
        }
    }

    /// Register a synchronous listener.
    ///
    /// The listener stays attached until the returned handle is dropped.
    pub fn listen<F>(&self, filter: EventFilter, callback: F) -> ListenerHandle
    where
        F: Fn(&AppEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        // Holding the queue lock pins the watermark: no event can be
        // enqueued between reading `next_seq` and registering.
        let queue = self.inner.queue.lock();
        self.inner.listeners.write().push(Arc::new(Listener {
            id,
            filter,
            from_seq: queue.next_seq,
            callback: Box::new(callback),
        }));
        drop(queue);

        ListenerHandle {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Open an async stream of matching events.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let queue = self.inner.queue.lock();
        let receiver = self.inner.sender.subscribe();
        let from_seq = queue.next_seq;
        drop(queue);

        EventStream {
            receiver,
            filter,
            from_seq,
        }
    }

    /// Publish a derived event on a named channel and deliver it.
    pub fn publish<T>(&self, usecase_name: &'static str, channel: &'static str, payload: T)
    where
        T: Send + Sync + 'static,
    {
        self.enqueue(usecase_name, channel, Arc::new(payload));
        self.flush();
    }

    /// Number of attached synchronous listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Append an event to the queue without delivering it.
    ///
    /// The store calls this while holding its state lock so that event order
    /// equals reducer order, then calls [`flush`](Self::flush) after
    /// releasing it.
    pub(crate) fn enqueue(
        &self,
        usecase_name: &'static str,
        action_name: &'static str,
        payload: Arc<dyn Any + Send + Sync>,
    ) -> u64 {
        let mut queue = self.inner.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push_back(AppEvent {
            seq,
            usecase_name,
            action_name,
            payload,
        });
        seq
    }

    /// Deliver queued events. A caller that finds delivery already in
    /// progress returns immediately; the active deliverer drains its events.
    pub(crate) fn flush(&self) {
        loop {
            if self.inner.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                let next = self.inner.queue.lock().pending.pop_front();
                match next {
                    Some(event) => self.deliver(&event),
                    None => break,
                }
            }
            self.inner.delivering.store(false, Ordering::Release);
            // An event enqueued after the last pop but before the flag was
            // cleared would otherwise wait for the next flush.
            if self.inner.queue.lock().pending.is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, event: &AppEvent) {
        let listeners: Vec<Arc<Listener>> = self.inner.listeners.read().clone();
        for listener in listeners {
            if event.seq < listener.from_seq || !listener.filter.matches(event) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(event)));
            if outcome.is_err() {
                tracing::error!(
                    listener = listener.id,
                    usecase = event.usecase_name,
                    action = event.action_name,
                    "Event listener panicked"
                );
            }
        }
        // No receivers is not an error: nobody subscribed yet.
        let _ = self.inner.sender.send(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

/// Keeps a synchronous listener attached; dropping it detaches the listener.
pub struct ListenerHandle {
    id: u64,
    bus: Weak<BusInner>,
}

impl ListenerHandle {
    /// Detach explicitly.
    pub fn detach(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.listeners.write().retain(|listener| listener.id != self.id);
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Async stream
// ─────────────────────────────────────────────────────────────────────────────

/// Async view over the bus, filtered and watermarked at subscription time.
pub struct EventStream {
    receiver: broadcast::Receiver<AppEvent>,
    filter: EventFilter,
    from_seq: u64,
}

impl EventStream {
    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next matching event that is already buffered, if any.
    pub fn try_next(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged behind the bus");
                }
                Err(_) => return None,
            }
        }
    }

    fn accepts(&self, event: &AppEvent) -> bool {
        event.seq >= self.from_seq && self.filter.matches(event)
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filter", &self.filter)
            .field("from_seq", &self.from_seq)
            .finish_non_exhaustive()
    }
}
