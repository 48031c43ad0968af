//! Steps: pipeline nodes wrapping one operation instance.
//!
//! A step runs its operation only when every input has a value and either an
//! input changed since the last run or the run is forced. Failures stay inside
//! the step: outputs go back to their initial values and the witness reports
//! what happened.
//!
//! Running and removal share one mutex, so a removal either waits for an
//! in-flight perform or prevents the next one; nothing performs after
//! [`Step::set_removed`] returns.

use crate::error::Result;
use crate::pipeline::bus::{panic_message, EventBus, Subscriber};
use crate::pipeline::event::{Event, EventKind, Origin};
use crate::pipeline::id::{SocketId, StepId};
use crate::pipeline::metrics::Timer;
use crate::pipeline::operation::{Operation, OperationDescription, OperationMetaData};
use crate::pipeline::socket::{Owner, Socket};
use crate::pipeline::witness::ExceptionWitness;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Builds steps whose sockets post to one bus.
#[derive(Clone)]
pub struct StepFactory {
    bus: EventBus,
}

impl StepFactory {
    pub fn new(bus: &EventBus) -> Self {
        Self { bus: bus.clone() }
    }

    /// Instantiate a fresh operation from `metadata` and wrap it in a step.
    pub fn create(&self, metadata: &OperationMetaData) -> Result<Arc<Step>> {
        let operation = metadata.instantiate(&self.bus)?;
        let id = StepId::next();
        for socket in operation
            .input_sockets()
            .iter()
            .chain(operation.output_sockets())
        {
            socket.set_owner(Owner::Step(id))?;
        }
        tracing::debug!("Created {} for operation '{}'", id, metadata.name());
        Ok(Arc::new(Step {
            id,
            description: metadata.description().clone(),
            witness: ExceptionWitness::new(Origin::Step(id), &self.bus),
            timer: Timer::new(Origin::Step(id), &self.bus),
            operation,
            removed: Mutex::new(false),
        }))
    }
}

pub struct Step {
    id: StepId,
    description: OperationDescription,
    operation: Box<dyn Operation>,
    witness: ExceptionWitness,
    timer: Timer,
    /// Guards perform against removal.
    removed: Mutex<bool>,
}

impl Step {
    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn description(&self) -> &OperationDescription {
        &self.description
    }

    pub fn name(&self) -> &str {
        self.description.name()
    }

    pub fn operation(&self) -> &dyn Operation {
        self.operation.as_ref()
    }

    pub fn input_sockets(&self) -> &[Arc<Socket>] {
        self.operation.input_sockets()
    }

    pub fn output_sockets(&self) -> &[Arc<Socket>] {
        self.operation.output_sockets()
    }

    pub fn input(&self, identifier: &str) -> Option<&Arc<Socket>> {
        self.input_sockets()
            .iter()
            .find(|s| s.identifier() == identifier)
    }

    pub fn output(&self, identifier: &str) -> Option<&Arc<Socket>> {
        self.output_sockets()
            .iter()
            .find(|s| s.identifier() == identifier)
    }

    pub fn socket_by_uid(&self, uid: SocketId) -> Option<&Arc<Socket>> {
        self.input_sockets()
            .iter()
            .chain(self.output_sockets())
            .find(|s| s.uid() == uid)
    }

    pub fn witness(&self) -> &ExceptionWitness {
        &self.witness
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    fn lock_removed(&self) -> MutexGuard<'_, bool> {
        self.removed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_removed(&self) -> bool {
        *self.lock_removed()
    }

    /// Mark the step removed and clean up its operation. Terminal.
    pub fn set_removed(&self) {
        let mut removed = self.lock_removed();
        if *removed {
            return;
        }
        *removed = true;
        self.operation.clean_up();
        tracing::debug!("{} ('{}') removed", self.id, self.name());
    }

    fn reset_outputs(&self) {
        for output in self.output_sockets() {
            output.reset_value_to_initial();
        }
    }

    /// Run the operation if its inputs warrant it.
    ///
    /// `force` runs even when no input changed since the last run.
    pub fn run_perform(&self, force: bool) {
        for input in self.input_sockets() {
            if !input.has_value() {
                self.witness.flag_warning(format!(
                    "{} must have a value to run this step.",
                    input.identifier()
                ));
                self.reset_outputs();
                return;
            }
        }

        // Every input is observed so that every dirty flag is cleared.
        let any_dirty = self
            .input_sockets()
            .iter()
            .fold(false, |dirty, input| input.dirtied() || dirty);
        if !force && !any_dirty {
            return;
        }

        let outcome = {
            let removed = self.lock_removed();
            if *removed {
                return;
            }
            self.perform_timed()
        };

        match outcome {
            Ok(()) => self.witness.clear_exception(),
            Err(e) => {
                tracing::error!("{} ('{}') failed: {:#}", self.id, self.name(), e);
                self.witness.flag_exception(
                    format!("The {} operation did not perform correctly.", self.name()),
                    &e,
                );
                self.reset_outputs();
            }
        }
    }

    fn perform_timed(&self) -> anyhow::Result<()> {
        let caught = self
            .timer
            .time(|| panic::catch_unwind(AssertUnwindSafe(|| self.operation.perform())))?;
        match caught {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "perform panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

impl Subscriber for Step {
    fn interests(&self) -> Vec<EventKind> {
        self.operation.interests()
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        self.operation.on_event(event);
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("operation", &self.name())
            .finish()
    }
}
