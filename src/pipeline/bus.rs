//! Synchronous, typed publish/subscribe dispatcher.
//!
//! Every [`EventKind`] has its own handler list. [`EventBus::post`] snapshots
//! the list for the posted kind, releases the lock and calls each handler on
//! the posting thread, so a post returns only once every handler has run.
//! Because the lock is not held during dispatch, handlers may post further
//! events, register and unregister re-entrantly.
//!
//! Registered objects are held weakly; a dropped subscriber simply stops
//! receiving events. Closures registered with [`EventBus::subscribe`] are
//! owned by the bus until unsubscribed.

use crate::pipeline::event::{Event, EventKind};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Something that wants to hear about events.
pub trait Subscriber: Send + Sync {
    /// Event kinds this subscriber is interested in. Read once, at registration.
    fn interests(&self) -> Vec<EventKind>;

    fn on_event(self: Arc<Self>, event: &Event);
}

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberKey(usize);

impl SubscriberKey {
    fn of<S: ?Sized>(subscriber: &Arc<S>) -> Self {
        Self(Arc::as_ptr(subscriber) as *const () as usize)
    }
}

#[derive(Clone)]
enum Target {
    Weak(Weak<dyn Subscriber>),
    Owned(Arc<dyn Subscriber>),
}

#[derive(Clone)]
struct Handler {
    key: SubscriberKey,
    target: Target,
}

impl Handler {
    fn upgrade(&self) -> Option<Arc<dyn Subscriber>> {
        match &self.target {
            Target::Weak(weak) => weak.upgrade(),
            Target::Owned(strong) => Some(strong.clone()),
        }
    }

    fn is_alive(&self) -> bool {
        match &self.target {
            Target::Weak(weak) => weak.strong_count() > 0,
            Target::Owned(_) => true,
        }
    }
}

struct FnSubscriber<F> {
    kinds: Vec<EventKind>,
    callback: F,
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn interests(&self) -> Vec<EventKind> {
        self.kinds.clone()
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        (self.callback)(event)
    }
}

#[derive(Default)]
struct BusInner {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for the kinds it reports. Registering the same
    /// object twice is a no-op.
    pub fn register<S: Subscriber + 'static>(&self, subscriber: &Arc<S>) -> SubscriberKey {
        let key = SubscriberKey::of(subscriber);
        let as_dyn: Arc<dyn Subscriber> = subscriber.clone();
        let target = Target::Weak(Arc::downgrade(&as_dyn));
        self.insert(key, subscriber.interests(), target);
        key
    }

    /// Register a closure for the given kinds.
    pub fn subscribe<F>(&self, kinds: &[EventKind], callback: F) -> SubscriberKey
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let subscriber = Arc::new(FnSubscriber {
            kinds: kinds.to_vec(),
            callback,
        });
        let key = SubscriberKey::of(&subscriber);
        self.insert(key, kinds.to_vec(), Target::Owned(subscriber));
        key
    }

    fn insert(&self, key: SubscriberKey, kinds: Vec<EventKind>, target: Target) {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for kind in kinds {
            let list = handlers.entry(kind).or_default();
            list.retain(Handler::is_alive);
            if !list.iter().any(|h| h.key == key) {
                list.push(Handler {
                    key,
                    target: target.clone(),
                });
            }
        }
    }

    pub fn unregister<S: ?Sized>(&self, subscriber: &Arc<S>) {
        self.unsubscribe(SubscriberKey::of(subscriber));
    }

    pub fn unsubscribe(&self, key: SubscriberKey) {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for list in handlers.values_mut() {
            list.retain(|h| h.key != key);
        }
    }

    /// Whether `subscriber` currently receives events of `kind`.
    pub fn is_registered<S: ?Sized>(&self, subscriber: &Arc<S>, kind: EventKind) -> bool {
        let key = SubscriberKey::of(subscriber);
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .is_some_and(|list| list.iter().any(|h| h.key == key && h.is_alive()))
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, |list| list.iter().filter(|h| h.is_alive()).count())
    }

    /// Deliver `event` to every handler of its kind before returning.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still run.
    pub fn post(&self, event: Event) {
        let kind = event.kind();
        let targets: Vec<Arc<dyn Subscriber>> = {
            let handlers = self
                .inner
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(&kind)
                .map(|list| list.iter().filter_map(Handler::upgrade).collect())
                .unwrap_or_default()
        };

        tracing::trace!("Posting {:?} to {} handler(s)", event, targets.len());

        for target in targets {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| target.on_event(&event)));
            if let Err(payload) = outcome {
                tracing::error!(
                    "Subscriber panicked while handling {:?}: {}",
                    kind,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
