//! The pipeline graph container.
//!
//! [`Pipeline`] holds the ordered step list, the source list and the set of
//! active connections. It is the only writer of these collections and only
//! writes them from its own notification handlers; the public mutation
//! methods validate a request and post the matching event.
//!
//! Steps and sources have separate locks so readers of one never wait on
//! writers of the other. No lock is held while posting.

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::{EventBus, Subscriber};
use crate::pipeline::connection::{Connection, ConnectionValidator, DefaultConnectionValidator};
use crate::pipeline::event::{Event, EventKind};
use crate::pipeline::id::{ConnectionId, StepId};
use crate::pipeline::socket::Socket;
use crate::pipeline::source::SourceEntry;
use crate::pipeline::step::Step;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Total order over the steps of a pipeline.
pub trait StepIndexer {
    /// Position of `step`, or `-1` if it is not in the pipeline.
    fn index_of(&self, step: &Step) -> isize;

    fn compare_steps(&self, a: &Step, b: &Step) -> Ordering {
        (self.index_of(a) - self.index_of(b)).cmp(&0)
    }
}

pub struct Pipeline {
    bus: EventBus,
    steps: RwLock<Vec<Arc<Step>>>,
    sources: RwLock<Vec<Arc<SourceEntry>>>,
    connections: Mutex<BTreeMap<ConnectionId, Arc<Connection>>>,
    move_lock: Mutex<()>,
}

impl Pipeline {
    /// Create an empty pipeline listening on `bus`.
    pub fn new(bus: &EventBus) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            bus: bus.clone(),
            steps: RwLock::new(Vec::new()),
            sources: RwLock::new(Vec::new()),
            connections: Mutex::new(BTreeMap::new()),
            move_lock: Mutex::new(()),
        });
        bus.register(&pipeline);
        pipeline
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn read_steps(&self) -> RwLockReadGuard<'_, Vec<Arc<Step>>> {
        self.steps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_steps(&self) -> RwLockWriteGuard<'_, Vec<Arc<Step>>> {
        self.steps.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_sources(&self) -> RwLockReadGuard<'_, Vec<Arc<SourceEntry>>> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sources(&self) -> RwLockWriteGuard<'_, Vec<Arc<SourceEntry>>> {
        self.sources.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, BTreeMap<ConnectionId, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Snapshots ──

    /// Copy of the step list at this instant.
    pub fn steps(&self) -> Vec<Arc<Step>> {
        self.read_steps().clone()
    }

    /// Copy of the source list at this instant.
    pub fn sources(&self) -> Vec<Arc<SourceEntry>> {
        self.read_sources().clone()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.lock_connections().values().cloned().collect()
    }

    pub fn step_count(&self) -> usize {
        self.read_steps().len()
    }

    pub fn source_count(&self) -> usize {
        self.read_sources().len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock_connections().len()
    }

    pub fn step_by_id(&self, id: StepId) -> Option<Arc<Step>> {
        self.read_steps().iter().find(|s| s.id() == id).cloned()
    }

    pub fn contains_step(&self, step: &Step) -> bool {
        self.index_of(step) >= 0
    }

    fn index_of_id(&self, id: StepId) -> isize {
        self.read_steps()
            .iter()
            .position(|s| s.id() == id)
            .map_or(-1, |i| i as isize)
    }

    /// Whether `a` comes before `b`. A step that is not present counts as `-1`.
    pub fn is_before(&self, a: &Step, b: &Step) -> bool {
        let steps = self.read_steps();
        let index = |step: &Step| {
            steps
                .iter()
                .position(|s| s.id() == step.id())
                .map_or(-1, |i| i as isize)
        };
        index(a) < index(b)
    }

    /// Index halfway between `lower` and `higher`, falling back to just
    /// after `lower`, at `higher`, or the end when either is absent.
    pub fn index_between(&self, lower: Option<&Step>, higher: Option<&Step>) -> usize {
        let steps = self.read_steps();
        let index = |step: Option<&Step>| {
            step.and_then(|step| steps.iter().position(|s| s.id() == step.id()))
        };
        match (index(lower), index(higher)) {
            (Some(lower), Some(higher)) => lower + 1 + lower.abs_diff(higher) / 2,
            (Some(lower), None) => lower + 1,
            (None, Some(higher)) => higher,
            (None, None) => steps.len(),
        }
    }

    // ── Requests ──

    /// Append `step` to the end of the pipeline.
    pub fn add_step(&self, step: Arc<Step>) -> Result<()> {
        self.request_add(step, None)
    }

    pub fn add_step_at(&self, index: usize, step: Arc<Step>) -> Result<()> {
        self.request_add(step, Some(index))
    }

    /// Insert `step` between two existing steps.
    pub fn add_step_between(
        &self,
        step: Arc<Step>,
        lower: Option<&Step>,
        higher: Option<&Step>,
    ) -> Result<()> {
        let index = self.index_between(lower, higher);
        self.request_add(step, Some(index))
    }

    fn request_add(&self, step: Arc<Step>, index: Option<usize>) -> Result<()> {
        if step.is_removed() {
            return Err(PipeflowError::StepRemoved(step.id()));
        }
        if let Some(index) = index {
            let len = self.step_count();
            if index > len {
                return Err(PipeflowError::IndexOutOfBounds { index, len });
            }
        }
        self.bus.post(Event::StepAdded { step, index });
        Ok(())
    }

    pub fn remove_step(&self, step: &Arc<Step>) -> Result<()> {
        if !self.contains_step(step) {
            return Err(PipeflowError::StepNotFound(step.id()));
        }
        self.bus.post(Event::StepRemoved(step.clone()));
        Ok(())
    }

    /// Move `step` by `delta` positions, saturating at either end.
    pub fn move_step(&self, step: &Arc<Step>, delta: isize) -> Result<()> {
        if !self.contains_step(step) {
            return Err(PipeflowError::StepNotFound(step.id()));
        }
        self.bus.post(Event::StepMoved {
            step: step.clone(),
            delta,
        });
        Ok(())
    }

    /// Move `step` so it sits between `lower` and `higher`.
    pub fn move_step_between(
        &self,
        step: &Arc<Step>,
        lower: Option<&Step>,
        higher: Option<&Step>,
    ) -> Result<()> {
        let index = self.index_between(lower, higher) as isize;
        let current = self.index_of(step);
        if current < 0 {
            return Err(PipeflowError::StepNotFound(step.id()));
        }
        let delta = if index > current {
            index - (current + 1)
        } else {
            index - current
        };
        self.move_step(step, delta)
    }

    pub fn add_source(&self, source: Arc<SourceEntry>) {
        self.bus.post(Event::SourceAdded(source));
    }

    pub fn remove_source(&self, source: &Arc<SourceEntry>) {
        self.bus.post(Event::SourceRemoved(source.clone()));
    }

    /// Validate and add a connection from `output` to `input`.
    pub fn connect(&self, output: &Arc<Socket>, input: &Arc<Socket>) -> Result<Arc<Connection>> {
        let connection = Connection::new(output.clone(), input.clone(), self)?;
        self.bus.post(Event::ConnectionAdded(connection.clone()));
        Ok(connection)
    }

    pub fn remove_connection(&self, connection: &Arc<Connection>) {
        self.bus.post(Event::ConnectionRemoved(connection.clone()));
    }

    /// Remove every step, then every source.
    pub fn clear(&self) {
        for step in self.steps() {
            self.bus.post(Event::StepRemoved(step));
        }
        for source in self.sources() {
            self.bus.post(Event::SourceRemoved(source));
        }
    }

    // ── Handlers ──

    fn on_step_added(&self, step: &Arc<Step>, index: Option<usize>) {
        if step.is_removed() {
            tracing::warn!("Ignoring add of removed {}", step.id());
            return;
        }
        {
            let mut steps = self.write_steps();
            if steps.iter().any(|s| s.id() == step.id()) {
                tracing::warn!("{} is already in the pipeline", step.id());
                return;
            }
            let at = index.map_or(steps.len(), |i| i.min(steps.len()));
            steps.insert(at, step.clone());
            tracing::debug!("Added {} ('{}') at index {}", step.id(), step.name(), at);
        }
        self.bus.register(step);
    }

    fn on_step_removed(&self, step: &Arc<Step>) {
        self.write_steps().retain(|s| s.id() != step.id());
        for socket in step.output_sockets() {
            socket.set_previewed(false);
        }
        step.set_removed();
        self.bus.unregister(step);
        tracing::debug!("Removed {} ('{}')", step.id(), step.name());
    }

    fn on_step_moved(&self, step: &Arc<Step>, delta: isize) {
        let _moving = self.move_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut steps = self.write_steps();
        let Some(old) = steps.iter().position(|s| s.id() == step.id()) else {
            tracing::warn!("Cannot move {}: not in the pipeline", step.id());
            return;
        };
        let moved = steps.remove(old);
        let new = (old as isize).saturating_add(delta).clamp(0, steps.len() as isize) as usize;
        steps.insert(new, moved);
        tracing::debug!("Moved {} from {} to {}", step.id(), old, new);
    }

    fn on_source_added(&self, source: &Arc<SourceEntry>) {
        let mut sources = self.write_sources();
        if !sources.iter().any(|s| s.id() == source.id()) {
            sources.push(source.clone());
            tracing::debug!("Added {} ('{}')", source.id(), source.name());
        }
    }

    fn on_source_removed(&self, source: &Arc<SourceEntry>) {
        self.write_sources().retain(|s| s.id() != source.id());
        for socket in source.output_sockets() {
            socket.set_previewed(false);
        }
        source.set_removed();
        tracing::debug!("Removed {} ('{}')", source.id(), source.name());
    }

    fn on_connection_added(&self, connection: &Arc<Connection>) {
        let inserted = self
            .lock_connections()
            .insert(connection.id(), connection.clone())
            .is_none();
        if inserted {
            self.bus.register(connection);
            connection.activate();
            tracing::debug!("Added {}", connection.id());
        }
    }

    fn on_connection_removed(&self, connection: &Arc<Connection>) {
        let removed = self.lock_connections().remove(&connection.id()).is_some();
        if removed {
            self.bus.unregister(connection);
            connection.deactivate();
            tracing::debug!("Removed {}", connection.id());
        }
    }
}

impl StepIndexer for Pipeline {
    fn index_of(&self, step: &Step) -> isize {
        self.index_of_id(step.id())
    }
}

impl ConnectionValidator for Pipeline {
    /// Direction and type rules, one connection per input, and no
    /// connection from a step to itself or to an earlier step.
    fn validate(&self, output: &Socket, input: &Socket) -> Result<()> {
        DefaultConnectionValidator.validate(output, input)?;

        if input.is_connected() {
            return Err(PipeflowError::InvalidConnection(format!(
                "input '{}' is already connected",
                input.identifier()
            )));
        }

        if let (Some(from), Some(to)) = (output.step(), input.step()) {
            if self.index_of_id(from) >= self.index_of_id(to) {
                return Err(PipeflowError::InvalidConnection(format!(
                    "{} must come before {} to connect '{}' -> '{}'",
                    from,
                    to,
                    output.identifier(),
                    input.identifier()
                )));
            }
        }
        Ok(())
    }
}

impl Subscriber for Pipeline {
    fn interests(&self) -> Vec<EventKind> {
        EventKind::STRUCTURAL.to_vec()
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        match event {
            Event::StepAdded { step, index } => self.on_step_added(step, *index),
            Event::StepRemoved(step) => self.on_step_removed(step),
            Event::StepMoved { step, delta } => self.on_step_moved(step, *delta),
            Event::SourceAdded(source) => self.on_source_added(source),
            Event::SourceRemoved(source) => self.on_source_removed(source),
            Event::ConnectionAdded(connection) => self.on_connection_added(connection),
            Event::ConnectionRemoved(connection) => self.on_connection_removed(connection),
            _ => {}
        }
    }
}
