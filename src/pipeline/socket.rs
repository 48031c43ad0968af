//! Sockets: typed value cells on steps and sources.
//!
//! A socket carries one optional [`Value`] of the type fixed by its
//! [`SocketHint`], a direction, the entity that owns it and the ids of the
//! connections attached to it. Every write posts [`Event::SocketChanged`];
//! connecting the first or disconnecting the last connection posts
//! [`Event::SocketConnectivityChanged`].
//!
//! Internal state sits behind a mutex that is never held while posting.

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::EventBus;
use crate::pipeline::event::Event;
use crate::pipeline::hint::{SocketHint, Value};
use crate::pipeline::id::{ConnectionId, SocketId, SourceId, StepId};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Whether a socket is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// The entity a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Step(StepId),
    Source(SourceId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Step(id) => write!(f, "{}", id),
            Owner::Source(id) => write!(f, "{}", id),
        }
    }
}

struct SocketState {
    value: Option<Value>,
    owner: Option<Owner>,
    connections: BTreeSet<ConnectionId>,
}

pub struct Socket {
    uid: SocketId,
    hint: SocketHint,
    direction: Direction,
    bus: EventBus,
    state: Mutex<SocketState>,
    /// Set by every write, cleared by [`Socket::dirtied`].
    dirty: AtomicBool,
    /// Output sockets only.
    previewed: AtomicBool,
}

impl Socket {
    fn new(hint: SocketHint, direction: Direction, bus: &EventBus) -> Arc<Self> {
        let value = hint.initial_value();
        Arc::new(Self {
            uid: SocketId::next(),
            hint,
            direction,
            bus: bus.clone(),
            state: Mutex::new(SocketState {
                value,
                owner: None,
                connections: BTreeSet::new(),
            }),
            dirty: AtomicBool::new(true),
            previewed: AtomicBool::new(false),
        })
    }

    /// Create an input socket. Inputs may legitimately hold no value.
    pub fn input(hint: SocketHint, bus: &EventBus) -> Arc<Self> {
        Self::new(hint, Direction::Input, bus)
    }

    /// Create an output socket. Fails if the hint has no initial value.
    pub fn output(hint: SocketHint, bus: &EventBus) -> Result<Arc<Self>> {
        if !hint.has_initial_value() {
            return Err(PipeflowError::MissingInitialValue(
                hint.identifier().to_string(),
            ));
        }
        Ok(Self::new(hint, Direction::Output, bus))
    }

    fn state(&self) -> MutexGuard<'_, SocketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Identity ──

    pub fn uid(&self) -> SocketId {
        self.uid
    }

    pub fn hint(&self) -> &SocketHint {
        &self.hint
    }

    pub fn identifier(&self) -> &str {
        self.hint.identifier()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Ownership ──

    pub fn owner(&self) -> Option<Owner> {
        self.state().owner
    }

    pub fn step(&self) -> Option<StepId> {
        match self.owner() {
            Some(Owner::Step(id)) => Some(id),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<SourceId> {
        match self.owner() {
            Some(Owner::Source(id)) => Some(id),
            _ => None,
        }
    }

    /// Assign the owning step or source. A socket has at most one owner.
    pub fn set_owner(&self, owner: Owner) -> Result<()> {
        let mut state = self.state();
        match state.owner {
            Some(current) if current != owner => Err(PipeflowError::OwnershipConflict {
                socket: self.uid,
                current: current.to_string(),
            }),
            _ => {
                state.owner = Some(owner);
                Ok(())
            }
        }
    }

    // ── Value ──

    pub fn value(&self) -> Option<Value> {
        self.state().value.clone()
    }

    pub fn has_value(&self) -> bool {
        self.state().value.is_some()
    }

    /// Typed copy of the current value.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.value()
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn set<T: Any + Send + Sync>(self: &Arc<Self>, value: T) -> Result<()> {
        self.set_value(Arc::new(value))
    }

    pub fn set_value(self: &Arc<Self>, value: Value) -> Result<()> {
        self.set_value_optional(Some(value))
    }

    /// Store `value` after checking its type against the hint.
    pub fn set_value_optional(self: &Arc<Self>, value: Option<Value>) -> Result<()> {
        if let Some(v) = &value {
            let expected = self.hint.value_type();
            if !expected.matches(v) {
                return Err(PipeflowError::TypeMismatch {
                    socket: self.identifier().to_string(),
                    expected: expected.name(),
                    actual: "a value of another type".to_string(),
                });
            }
        }
        self.store(value);
        Ok(())
    }

    /// Put the hint's initial value back.
    pub fn reset_value_to_initial(self: &Arc<Self>) {
        self.store(self.hint.initial_value());
    }

    fn store(self: &Arc<Self>, value: Option<Value>) {
        self.state().value = value;
        self.dirty.store(true, Ordering::Release);
        self.bus.post(Event::SocketChanged(self.clone()));
    }

    /// Whether the value was written since the last call, clearing the flag.
    pub fn dirtied(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    // ── Connections ──

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.state().connections.iter().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }

    pub fn is_connected(&self) -> bool {
        !self.state().connections.is_empty()
    }

    pub(crate) fn add_connection(self: &Arc<Self>, connection: ConnectionId) {
        let became_connected = {
            let mut state = self.state();
            state.connections.insert(connection) && state.connections.len() == 1
        };
        if became_connected {
            self.bus.post(Event::SocketConnectivityChanged(self.clone()));
        }
    }

    pub(crate) fn remove_connection(self: &Arc<Self>, connection: ConnectionId) {
        let became_disconnected = {
            let mut state = self.state();
            state.connections.remove(&connection) && state.connections.is_empty()
        };
        if became_disconnected {
            self.bus.post(Event::SocketConnectivityChanged(self.clone()));
            if self.direction == Direction::Input {
                self.reset_value_to_initial();
            }
        }
    }

    // ── Preview ──

    pub fn is_previewed(&self) -> bool {
        self.previewed.load(Ordering::Acquire)
    }

    pub fn set_previewed(self: &Arc<Self>, previewed: bool) {
        if self.previewed.swap(previewed, Ordering::AcqRel) != previewed {
            self.bus.post(Event::SocketPreviewChanged(self.clone()));
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("uid", &self.uid)
            .field("identifier", &self.identifier())
            .field("direction", &self.direction)
            .field("owner", &self.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::EventKind;
    use std::sync::atomic::AtomicUsize;

    fn number_hint(id: &str, initial: Option<f64>) -> SocketHint {
        let builder = SocketHint::builder::<f64>(id);
        match initial {
            Some(v) => builder.initial_value(v).build().unwrap(),
            None => builder.build().unwrap(),
        }
    }

    fn count(bus: &EventBus, kind: EventKind) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.subscribe(&[kind], move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn test_starts_at_initial_value() {
        let bus = EventBus::new();
        let socket = Socket::input(number_hint("x", Some(2.5)), &bus);
        assert_eq!(socket.get::<f64>(), Some(2.5));

        let empty = Socket::input(number_hint("y", None), &bus);
        assert!(!empty.has_value());
    }

    #[test]
    fn test_output_requires_initial_value() {
        let bus = EventBus::new();
        let err = Socket::output(number_hint("out", None), &bus).unwrap_err();
        assert!(matches!(err, PipeflowError::MissingInitialValue(ref id) if id == "out"));
        assert!(Socket::output(number_hint("out", Some(0.0)), &bus).is_ok());
    }

    #[test]
    fn test_set_value_posts_change() {
        let bus = EventBus::new();
        let changes = count(&bus, EventKind::SocketChanged);
        let socket = Socket::input(number_hint("x", Some(0.0)), &bus);

        socket.set(4.0f64).unwrap();
        assert_eq!(socket.get::<f64>(), Some(4.0));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let bus = EventBus::new();
        let socket = Socket::input(number_hint("x", Some(1.0)), &bus);
        let err = socket.set("text".to_string()).unwrap_err();
        assert!(matches!(err, PipeflowError::TypeMismatch { .. }));
        assert_eq!(socket.get::<f64>(), Some(1.0));
    }

    #[test]
    fn test_dirty_flag_cleared_on_observation() {
        let bus = EventBus::new();
        let socket = Socket::input(number_hint("x", Some(0.0)), &bus);
        assert!(socket.dirtied());
        assert!(!socket.dirtied());
        socket.set(1.0f64).unwrap();
        assert!(socket.dirtied());
        assert!(!socket.dirtied());
    }

    #[test]
    fn test_owner_is_exclusive() {
        let bus = EventBus::new();
        let socket = Socket::input(number_hint("x", None), &bus);
        let step = StepId::next();
        socket.set_owner(Owner::Step(step)).unwrap();
        socket.set_owner(Owner::Step(step)).unwrap();
        assert_eq!(socket.step(), Some(step));
        assert_eq!(socket.source(), None);

        let err = socket.set_owner(Owner::Source(SourceId::next())).unwrap_err();
        assert!(matches!(err, PipeflowError::OwnershipConflict { .. }));
    }

    #[test]
    fn test_connectivity_only_on_transitions() {
        let bus = EventBus::new();
        let connectivity = count(&bus, EventKind::SocketConnectivityChanged);
        let socket = Socket::output(number_hint("out", Some(0.0)), &bus).unwrap();
        let (a, b) = (ConnectionId::next(), ConnectionId::next());

        socket.add_connection(a);
        socket.add_connection(b);
        assert_eq!(connectivity.load(Ordering::SeqCst), 1);

        socket.remove_connection(a);
        assert_eq!(connectivity.load(Ordering::SeqCst), 1);
        socket.remove_connection(b);
        assert_eq!(connectivity.load(Ordering::SeqCst), 2);
        assert!(!socket.is_connected());
    }

    #[test]
    fn test_input_resets_when_last_connection_removed() {
        let bus = EventBus::new();
        let socket = Socket::input(number_hint("in", Some(1.0)), &bus);
        let c = ConnectionId::next();
        socket.add_connection(c);
        socket.set(99.0f64).unwrap();

        socket.remove_connection(c);
        assert_eq!(socket.get::<f64>(), Some(1.0));
    }

    #[test]
    fn test_preview_notifies_only_on_change() {
        let bus = EventBus::new();
        let previews = count(&bus, EventKind::SocketPreviewChanged);
        let socket = Socket::output(number_hint("out", Some(0.0)), &bus).unwrap();

        socket.set_previewed(true);
        socket.set_previewed(true);
        socket.set_previewed(false);
        assert_eq!(previews.load(Ordering::SeqCst), 2);
        assert!(!socket.is_previewed());
    }

    #[test]
    fn test_reset_to_initial() {
        let bus = EventBus::new();
        let socket = Socket::output(number_hint("out", Some(3.0)), &bus).unwrap();
        socket.set(10.0f64).unwrap();
        socket.reset_value_to_initial();
        assert_eq!(socket.get::<f64>(), Some(3.0));
    }
}
