//! Connections: validated edges from an output socket to an input socket.
//!
//! A connection is inert until the pipeline activates it in response to
//! [`Event::ConnectionAdded`]. While active it copies the output's value into
//! the input every time the output changes, one hop per notification. It
//! removes itself when the step or source owning either endpoint goes away.

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::Subscriber;
use crate::pipeline::event::{Event, EventKind};
use crate::pipeline::id::ConnectionId;
use crate::pipeline::socket::{Direction, Owner, Socket};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Decides whether two sockets may be connected.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionValidator {
    fn validate(&self, output: &Socket, input: &Socket) -> Result<()>;

    fn can_connect(&self, output: &Socket, input: &Socket) -> bool {
        self.validate(output, input).is_ok()
    }
}

/// Direction and type compatibility only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionValidator;

impl ConnectionValidator for DefaultConnectionValidator {
    fn validate(&self, output: &Socket, input: &Socket) -> Result<()> {
        if output.direction() != Direction::Output || input.direction() != Direction::Input {
            return Err(PipeflowError::InvalidConnection(format!(
                "'{}' ({}) -> '{}' ({}) must go from an output to an input",
                output.identifier(),
                output.direction(),
                input.identifier(),
                input.direction()
            )));
        }
        if !input.hint().is_compatible_with(output.hint()) {
            return Err(PipeflowError::InvalidConnection(format!(
                "'{}' accepts {:?} but '{}' produces {:?}",
                input.identifier(),
                input.hint().value_type(),
                output.identifier(),
                output.hint().value_type()
            )));
        }
        Ok(())
    }
}

pub struct Connection {
    id: ConnectionId,
    output: Arc<Socket>,
    input: Arc<Socket>,
    active: AtomicBool,
}

impl Connection {
    /// Build a connection, failing closed if `validator` rejects the pair.
    pub fn new(
        output: Arc<Socket>,
        input: Arc<Socket>,
        validator: &dyn ConnectionValidator,
    ) -> Result<Arc<Self>> {
        validator.validate(&output, &input)?;
        Ok(Arc::new(Self {
            id: ConnectionId::next(),
            output,
            input,
            active: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn output_socket(&self) -> &Arc<Socket> {
        &self.output
    }

    pub fn input_socket(&self) -> &Arc<Socket> {
        &self.input
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Attach to both sockets and push the current output value downstream.
    pub(crate) fn activate(&self) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        self.input.add_connection(self.id);
        self.output.add_connection(self.id);
        self.push();
    }

    /// Detach from both sockets. The input falls back to its initial value
    /// if this was its last connection.
    pub(crate) fn deactivate(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.input.remove_connection(self.id);
        self.output.remove_connection(self.id);
    }

    fn push(&self) {
        tracing::trace!(
            "{} pushing '{}' -> '{}'",
            self.id,
            self.output.identifier(),
            self.input.identifier()
        );
        if let Err(e) = self.input.set_value_optional(self.output.value()) {
            tracing::warn!("{} could not propagate value: {}", self.id, e);
        }
    }

    fn touches(&self, owner: Owner) -> bool {
        self.output.owner() == Some(owner) || self.input.owner() == Some(owner)
    }
}

impl Subscriber for Connection {
    fn interests(&self) -> Vec<EventKind> {
        vec![
            EventKind::SocketChanged,
            EventKind::StepRemoved,
            EventKind::SourceRemoved,
        ]
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        if !self.is_active() {
            return;
        }
        let orphaned = match event {
            Event::SocketChanged(socket) => {
                if Arc::ptr_eq(socket, &self.output) {
                    self.push();
                }
                false
            }
            Event::StepRemoved(step) => self.touches(Owner::Step(step.id())),
            Event::SourceRemoved(source) => self.touches(Owner::Source(source.id())),
            _ => false,
        };
        if orphaned {
            tracing::debug!("{} lost an endpoint, removing it", self.id);
            let bus = self.output.bus().clone();
            bus.post(Event::ConnectionRemoved(self));
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("output", &self.output.uid())
            .field("input", &self.input.uid())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bus::EventBus;
    use crate::pipeline::hint::SocketHint;

    fn hint<T: std::any::Any + Clone + Send + Sync>(id: &str, initial: T) -> SocketHint {
        SocketHint::builder::<T>(id)
            .initial_value(initial)
            .build()
            .unwrap()
    }

    fn pair(bus: &EventBus) -> (Arc<Socket>, Arc<Socket>) {
        let out = Socket::output(hint("out", 0.0f64), bus).unwrap();
        let input = Socket::input(hint("in", -1.0f64), bus);
        (out, input)
    }

    #[test]
    fn test_same_direction_rejected() {
        let bus = EventBus::new();
        let a = Socket::output(hint("a", 0.0f64), &bus).unwrap();
        let b = Socket::output(hint("b", 0.0f64), &bus).unwrap();
        assert!(Connection::new(a, b, &DefaultConnectionValidator).is_err());

        let c = Socket::input(hint("c", 0.0f64), &bus);
        let d = Socket::input(hint("d", 0.0f64), &bus);
        assert!(Connection::new(c, d, &DefaultConnectionValidator).is_err());
    }

    #[test]
    fn test_swapped_direction_rejected() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        assert!(Connection::new(input, out, &DefaultConnectionValidator).is_err());
    }

    #[test]
    fn test_incompatible_types_rejected() {
        let bus = EventBus::new();
        let out = Socket::output(hint("out", 0.0f64), &bus).unwrap();
        let input = Socket::input(hint("in", false), &bus);
        let err = Connection::new(out, input, &DefaultConnectionValidator).unwrap_err();
        assert!(matches!(err, PipeflowError::InvalidConnection(_)));
    }

    #[test]
    fn test_validator_rejection_fails_closed() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        let mut validator = MockConnectionValidator::new();
        validator
            .expect_validate()
            .times(1)
            .returning(|_, _| Err(PipeflowError::InvalidConnection("vetoed".into())));

        let err = Connection::new(out.clone(), input.clone(), &validator).unwrap_err();
        assert!(err.to_string().contains("vetoed"));
        assert!(!out.is_connected());
        assert!(!input.is_connected());
    }

    #[test]
    fn test_validator_sees_both_endpoints() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        let (out_uid, in_uid) = (out.uid(), input.uid());
        let mut validator = MockConnectionValidator::new();
        validator
            .expect_validate()
            .withf(move |o, i| o.uid() == out_uid && i.uid() == in_uid)
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(Connection::new(out, input, &validator).is_ok());
    }

    #[test]
    fn test_activation_pushes_current_value() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        out.set(5.0f64).unwrap();

        let conn = Connection::new(out.clone(), input.clone(), &DefaultConnectionValidator).unwrap();
        assert_eq!(input.get::<f64>(), Some(-1.0));

        conn.activate();
        assert_eq!(input.get::<f64>(), Some(5.0));
        assert_eq!(out.connections(), vec![conn.id()]);
        assert_eq!(input.connections(), vec![conn.id()]);
    }

    #[test]
    fn test_propagates_output_changes() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        let conn = Connection::new(out.clone(), input.clone(), &DefaultConnectionValidator).unwrap();
        bus.register(&conn);
        conn.activate();

        out.set(42.0f64).unwrap();
        assert_eq!(input.get::<f64>(), Some(42.0));
    }

    #[test]
    fn test_deactivate_resets_input() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        out.set(8.0f64).unwrap();
        let conn = Connection::new(out.clone(), input.clone(), &DefaultConnectionValidator).unwrap();
        conn.activate();
        assert_eq!(input.get::<f64>(), Some(8.0));

        conn.deactivate();
        assert!(!conn.is_active());
        assert_eq!(input.get::<f64>(), Some(-1.0));
        assert!(!out.is_connected());
    }

    #[test]
    fn test_inactive_connection_ignores_changes() {
        let bus = EventBus::new();
        let (out, input) = pair(&bus);
        let conn = Connection::new(out.clone(), input.clone(), &DefaultConnectionValidator).unwrap();
        bus.register(&conn);

        out.set(3.0f64).unwrap();
        assert_eq!(input.get::<f64>(), Some(-1.0));
    }
}
