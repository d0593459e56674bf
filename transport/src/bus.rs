//! Broadcaster/listener signal bus
//!
//! A [`Broadcaster`] is a named event source owned by whichever component raises events on it.
//! A [`Listener`] aggregates events from any number of broadcasters into a single inbox which
//! exactly one thread drains with [`Listener::wait_for_event`] or one of its filtered
//! variants. Subscriptions are live: events broadcast before [`Listener::start_listening`] are
//! never replayed.
//!
//! Events from one broadcaster reach a given listener in broadcast order. No ordering is
//! promised across broadcasters feeding the same listener.
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use uuid::Uuid;

use crate::events::{Event, EventKind, EventMask, Source};

pub type ListenerId = Uuid;

struct Subscription {
    listener: ListenerId,
    mask: EventMask,
    inbox: Sender<Event>,
}

struct BroadcasterInner {
    name: String,
    source: Source,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl BroadcasterInner {
    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        // a panic while holding the lock cannot leave the list half-updated
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A named source of events
///
/// Cloning a broadcaster is cheap and yields a handle to the same source, so it can be shared
/// with the threads that need to raise events on it or subscribe to it.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                name: name.into(),
                source,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn source(&self) -> Source {
        self.inner.source
    }

    /// Deliver an event to every listener subscribed with an overlapping mask
    ///
    /// Never blocks. Returns the number of listeners the event was delivered to.
    pub fn broadcast(&self, kind: EventKind) -> usize {
        let event = Event::new(self.source(), kind);
        let mask = event.mask();

        let mut delivered = 0;
        self.inner.subscriptions().retain(|subscription| {
            if !subscription.mask.intersects(mask) {
                return true;
            }

            match subscription.inbox.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::warn!(
                        broadcaster = %self.name(),
                        listener = %subscription.listener,
                        "listener inbox closed, dropping subscription"
                    );
                    false
                }
            }
        });

        tracing::trace!(broadcaster = %self.name(), ?mask, %delivered, "broadcast event");
        delivered
    }

    /// True if at least one listener is subscribed to any kind in `mask`
    pub fn has_listeners(&self, mask: EventMask) -> bool {
        self.inner
            .subscriptions()
            .iter()
            .any(|subscription| subscription.mask.intersects(mask))
    }

    /// True if both handles refer to the same broadcaster
    pub fn ptr_eq(&self, other: &Broadcaster) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn subscribe(&self, listener: ListenerId, mask: EventMask, inbox: &Sender<Event>) -> EventMask {
        let mut subscriptions = self.inner.subscriptions();
        match subscriptions
            .iter_mut()
            .find(|subscription| subscription.listener == listener)
        {
            Some(existing) => {
                existing.mask |= mask;
                existing.mask
            }
            None => {
                subscriptions.push(Subscription {
                    listener,
                    mask,
                    inbox: inbox.clone(),
                });
                mask
            }
        }
    }

    fn unsubscribe(&self, listener: ListenerId, mask: EventMask) -> bool {
        unsubscribe(&self.inner, listener, mask)
    }
}

fn unsubscribe(inner: &BroadcasterInner, listener: ListenerId, mask: EventMask) -> bool {
    let mut subscriptions = inner.subscriptions();
    let Some(position) = subscriptions
        .iter()
        .position(|subscription| subscription.listener == listener)
    else {
        return false;
    };

    subscriptions[position].mask.remove(mask);
    if subscriptions[position].mask.is_empty() {
        subscriptions.remove(position);
    }
    true
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.inner.name)
            .field("source", &self.inner.source)
            .finish()
    }
}

/// What a filtered wait does with events that do not match its filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unmatched {
    /// Keep them, in arrival order, for the next wait
    #[default]
    Requeue,
    /// Drop them
    Discard,
}

/// Proof that a [`Listener`] has been torn down and no longer references any broadcaster
#[derive(Debug)]
pub struct ListenerClosed {
    _private: (),
}

/// A single-reader inbox aggregating events from subscribed broadcasters
///
/// Waiting requires `&mut self`, so only the owning thread can drain the inbox.
pub struct Listener {
    id: ListenerId,
    name: String,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    deferred: VecDeque<Event>,
    subscriptions: Vec<Weak<BroadcasterInner>>,
    unmatched: Unmatched,
}

impl Listener {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tx,
            rx,
            deferred: VecDeque::new(),
            subscriptions: Vec::new(),
            unmatched: Unmatched::default(),
        }
    }

    /// Choose what filtered waits do with events from other sources
    pub fn with_unmatched(mut self, unmatched: Unmatched) -> Self {
        self.unmatched = unmatched;
        self
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events received but not yet returned by a wait
    pub fn pending(&self) -> usize {
        self.deferred.len() + self.rx.len()
    }

    /// Subscribe to the kinds in `mask` raised on `broadcaster`
    ///
    /// Subscribing again to the same broadcaster widens the existing subscription. Returns the
    /// full mask now subscribed to.
    pub fn start_listening(&mut self, broadcaster: &Broadcaster, mask: EventMask) -> EventMask {
        let acquired = broadcaster.subscribe(self.id, mask, &self.tx);
        if !self
            .subscriptions
            .iter()
            .any(|weak| weak.as_ptr() == Arc::as_ptr(&broadcaster.inner))
        {
            self.subscriptions.push(Arc::downgrade(&broadcaster.inner));
        }
        tracing::debug!(
            listener = %self.name,
            broadcaster = %broadcaster.name(),
            ?acquired,
            "listening for events"
        );
        acquired
    }

    /// Remove the kinds in `mask` from the subscription to `broadcaster`
    pub fn stop_listening(&mut self, broadcaster: &Broadcaster, mask: EventMask) -> bool {
        let removed = broadcaster.unsubscribe(self.id, mask);
        if !broadcaster.inner.subscriptions().iter().any(|s| s.listener == self.id) {
            self.subscriptions
                .retain(|weak| weak.as_ptr() != Arc::as_ptr(&broadcaster.inner));
        }
        removed
    }

    /// Block until any subscribed event arrives, or `timeout` elapses
    pub fn wait_for_event(&mut self, timeout: Duration) -> Option<Event> {
        if let Some(event) = self.deferred.pop_front() {
            return Some(event);
        }

        match Instant::now().checked_add(timeout) {
            Some(deadline) => match self.rx.recv_deadline(deadline) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.rx.recv().ok(),
        }
    }

    /// Block until an event of a kind in `mask` raised by `source` arrives, or `timeout` elapses
    ///
    /// Other events received meanwhile are handled according to the listener's [`Unmatched`]
    /// policy.
    pub fn wait_for_event_from(
        &mut self,
        timeout: Duration,
        source: Source,
        mask: EventMask,
    ) -> Option<Event> {
        if let Some(event) = self.take_deferred(source, mask) {
            return Some(event);
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            let received = match deadline {
                Some(deadline) => match self.rx.recv_deadline(deadline) {
                    Ok(event) => event,
                    Err(_) => return None,
                },
                None => self.rx.recv().ok()?,
            };

            if received.matches(source, mask) {
                return Some(received);
            }
            self.set_aside(received);
        }
    }

    /// Return the next already-received event of a kind in `mask` raised by `source`, without
    /// blocking
    pub fn next_event_from(&mut self, source: Source, mask: EventMask) -> Option<Event> {
        if let Some(event) = self.take_deferred(source, mask) {
            return Some(event);
        }

        loop {
            match self.rx.try_recv() {
                Ok(event) if event.matches(source, mask) => return Some(event),
                Ok(event) => self.set_aside(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Tear down every subscription and drop any undelivered events
    pub fn close(self) -> ListenerClosed {
        tracing::debug!(listener = %self.name, pending = %self.pending(), "closing listener");
        drop(self);
        ListenerClosed { _private: () }
    }

    fn take_deferred(&mut self, source: Source, mask: EventMask) -> Option<Event> {
        let position = self
            .deferred
            .iter()
            .position(|event| event.matches(source, mask))?;
        self.deferred.remove(position)
    }

    fn set_aside(&mut self, event: Event) {
        match self.unmatched {
            Unmatched::Requeue => self.deferred.push_back(event),
            Unmatched::Discard => {
                tracing::debug!(listener = %self.name, ?event, "discarding unmatched event");
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        for weak in self.subscriptions.drain(..) {
            if let Some(inner) = weak.upgrade() {
                unsubscribe(&inner, self.id, EventMask::all());
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::types::ProcessState;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn delivers_to_subscribed_listener() {
        let broadcaster = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::HAS_USER_INPUT);

        assert_eq!(
            broadcaster.broadcast(EventKind::HasUserInput("help".to_string())),
            1
        );

        let event = listener.wait_for_event(SHORT).unwrap();
        assert_eq!(event.source, Source::IoChannel);
        assert_eq!(event.kind, EventKind::HasUserInput("help".to_string()));
    }

    #[test]
    fn ignores_kinds_outside_the_mask() {
        let broadcaster = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::THREAD_DID_EXIT);

        assert_eq!(broadcaster.broadcast(EventKind::ThreadDidStart), 0);
        assert!(listener.wait_for_event(SHORT).is_none());
    }

    #[test]
    fn no_replay_of_earlier_events() {
        let broadcaster = Broadcaster::new("io", Source::IoChannel);
        broadcaster.broadcast(EventKind::ThreadDidStart);

        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::THREAD_DID_START);
        assert!(listener.wait_for_event(SHORT).is_none());
    }

    #[test]
    fn widening_a_subscription() {
        let broadcaster = Broadcaster::new("driver", Source::Driver);
        let mut listener = Listener::new("test");

        listener.start_listening(&broadcaster, EventMask::THREAD_SHOULD_EXIT);
        let acquired = listener.start_listening(&broadcaster, EventMask::THREAD_DID_START);

        assert_eq!(
            acquired,
            EventMask::THREAD_SHOULD_EXIT | EventMask::THREAD_DID_START
        );
        assert_eq!(broadcaster.broadcast(EventKind::ThreadDidStart), 1);
    }

    #[test]
    fn stop_listening_removes_kinds() {
        let broadcaster = Broadcaster::new("driver", Source::Driver);
        let mut listener = Listener::new("test");
        listener.start_listening(
            &broadcaster,
            EventMask::THREAD_SHOULD_EXIT | EventMask::THREAD_DID_START,
        );

        assert!(listener.stop_listening(&broadcaster, EventMask::THREAD_DID_START));
        assert_eq!(broadcaster.broadcast(EventKind::ThreadDidStart), 0);
        assert_eq!(broadcaster.broadcast(EventKind::ThreadShouldExit), 1);

        assert!(listener.stop_listening(&broadcaster, EventMask::THREAD_SHOULD_EXIT));
        assert!(!broadcaster.has_listeners(EventMask::all()));
    }

    #[test]
    fn dropping_the_listener_unsubscribes() {
        let broadcaster = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::all());
        assert!(broadcaster.has_listeners(EventMask::THREAD_DID_EXIT));

        let _closed = listener.close();
        assert!(!broadcaster.has_listeners(EventMask::all()));
        assert_eq!(broadcaster.broadcast(EventKind::ThreadDidExit), 0);
    }

    #[test]
    fn every_listener_receives_its_own_copy() {
        let broadcaster = Broadcaster::new("interpreter", Source::Interpreter);
        let mut first = Listener::new("first");
        let mut second = Listener::new("second");
        first.start_listening(&broadcaster, EventMask::QUIT_COMMAND_RECEIVED);
        second.start_listening(&broadcaster, EventMask::QUIT_COMMAND_RECEIVED);

        assert_eq!(broadcaster.broadcast(EventKind::QuitCommandReceived), 2);
        assert!(first.wait_for_event(SHORT).is_some());
        assert!(second.wait_for_event(SHORT).is_some());
    }

    #[test]
    fn wait_times_out() {
        let broadcaster = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::all());

        let timeout = Duration::from_millis(100);
        let started = Instant::now();
        assert!(listener.wait_for_event(timeout).is_none());
        let elapsed = started.elapsed();

        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(elapsed < timeout * 10, "returned late after {elapsed:?}");
    }

    #[test]
    fn wakes_a_blocked_waiter() {
        let broadcaster = Broadcaster::new("process", Source::Process);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::PROCESS_STATE_CHANGED);

        let producer = broadcaster.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.broadcast(EventKind::ProcessStateChanged {
                process: 42,
                state: ProcessState::Stopped,
                restarted: false,
            });
        });

        let event = listener.wait_for_event(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            event.kind,
            EventKind::ProcessStateChanged { process: 42, .. }
        ));
        handle.join().unwrap();
    }

    #[test]
    fn preserves_order_per_broadcaster() {
        let broadcaster = Broadcaster::new("interpreter", Source::Interpreter);
        let mut listener = Listener::new("test");
        listener.start_listening(&broadcaster, EventMask::ASYNC_OUTPUT);

        for i in 0..100 {
            broadcaster.broadcast(EventKind::AsyncOutput(i.to_string()));
        }

        for i in 0..100 {
            let event = listener.wait_for_event(SHORT).unwrap();
            assert_eq!(event.kind, EventKind::AsyncOutput(i.to_string()));
        }
    }

    #[test]
    fn filtered_wait_requeues_other_sources() {
        let io = Broadcaster::new("io", Source::IoChannel);
        let interpreter = Broadcaster::new("interpreter", Source::Interpreter);
        let mut listener = Listener::new("test");
        listener.start_listening(&io, EventMask::all());
        listener.start_listening(&interpreter, EventMask::all());

        interpreter.broadcast(EventKind::AsyncOutput("first".to_string()));
        interpreter.broadcast(EventKind::AsyncOutput("second".to_string()));
        io.broadcast(EventKind::ThreadDidStart);

        let event = listener
            .wait_for_event_from(SHORT, Source::IoChannel, EventMask::THREAD_DID_START)
            .unwrap();
        assert_eq!(event.kind, EventKind::ThreadDidStart);

        assert_eq!(listener.pending(), 2);
        assert_eq!(
            listener.wait_for_event(SHORT).unwrap().kind,
            EventKind::AsyncOutput("first".to_string())
        );
        assert_eq!(
            listener.wait_for_event(SHORT).unwrap().kind,
            EventKind::AsyncOutput("second".to_string())
        );
    }

    #[test]
    fn filtered_wait_can_discard_other_sources() {
        let io = Broadcaster::new("io", Source::IoChannel);
        let interpreter = Broadcaster::new("interpreter", Source::Interpreter);
        let mut listener = Listener::new("test").with_unmatched(Unmatched::Discard);
        listener.start_listening(&io, EventMask::all());
        listener.start_listening(&interpreter, EventMask::all());

        interpreter.broadcast(EventKind::AsyncOutput("lost".to_string()));
        io.broadcast(EventKind::ThreadDidStart);

        assert!(
            listener
                .wait_for_event_from(SHORT, Source::IoChannel, EventMask::THREAD_DID_START)
                .is_some()
        );
        assert_eq!(listener.pending(), 0);
        assert!(listener.wait_for_event(SHORT).is_none());
    }

    #[test]
    fn filtered_wait_times_out() {
        let io = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&io, EventMask::all());
        io.broadcast(EventKind::ThreadDidStart);

        assert!(
            listener
                .wait_for_event_from(SHORT, Source::IoChannel, EventMask::THREAD_DID_EXIT)
                .is_none()
        );
        assert_eq!(listener.pending(), 1);
    }

    #[test]
    fn next_event_from_does_not_block() {
        let io = Broadcaster::new("io", Source::IoChannel);
        let mut listener = Listener::new("test");
        listener.start_listening(&io, EventMask::all());

        assert!(
            listener
                .next_event_from(Source::IoChannel, EventMask::THREAD_DID_EXIT)
                .is_none()
        );

        io.broadcast(EventKind::ThreadDidStart);
        io.broadcast(EventKind::ThreadDidExit);
        let event = listener
            .next_event_from(Source::IoChannel, EventMask::THREAD_DID_EXIT)
            .unwrap();
        assert_eq!(event.kind, EventKind::ThreadDidExit);
        assert_eq!(
            listener.wait_for_event(SHORT).unwrap().kind,
            EventKind::ThreadDidStart
        );
    }
}
