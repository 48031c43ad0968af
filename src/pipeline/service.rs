//! Supervised background loops.
//!
//! An [`AutoRestartingService`] runs an iteration closure over and over on a
//! dedicated thread. When an iteration returns an error or panics, the loop is
//! rebuilt from its factory and started again, as long as the
//! [`RestartPolicy`] allows it. Each failure is reported as
//! [`Event::UnexpectedFailure`].

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::{panic_message, EventBus};
use crate::pipeline::event::Event;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    New,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::New => "new",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Terminated => "terminated",
            ServiceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How many times a failed loop is rebuilt, and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
    pub backoff: Duration,
}

impl RestartPolicy {
    pub const fn unlimited() -> Self {
        Self {
            max_restarts: None,
            backoff: Duration::ZERO,
        }
    }

    pub const fn never() -> Self {
        Self {
            max_restarts: Some(0),
            backoff: Duration::ZERO,
        }
    }

    pub fn should_restart(&self, restarts_so_far: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts_so_far < max)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

struct Shared {
    name: String,
    state: Mutex<ServiceState>,
    should_run: AtomicBool,
    failure: Mutex<Option<String>>,
    restarts: AtomicU32,
}

impl Shared {
    fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Passed to every iteration so it can poll for shutdown.
#[derive(Clone)]
pub struct ServiceHandle {
    shared: Arc<Shared>,
}

impl ServiceHandle {
    pub fn is_running(&self) -> bool {
        self.shared.should_run.load(Ordering::Acquire) && self.shared.state() == ServiceState::Running
    }
}

/// One loop body. Called repeatedly until it fails or the service stops.
pub type Iteration = Box<dyn FnMut(&ServiceHandle) -> anyhow::Result<()> + Send>;

type IterationFactory = dyn Fn() -> Iteration + Send + Sync;

pub struct AutoRestartingService {
    shared: Arc<Shared>,
    bus: EventBus,
    policy: RestartPolicy,
    thread_name: String,
    factory: Arc<IterationFactory>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRestartingService {
    pub fn new<F>(name: impl Into<String>, bus: &EventBus, policy: RestartPolicy, factory: F) -> Self
    where
        F: Fn() -> Iteration + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            thread_name: name.clone(),
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(ServiceState::New),
                should_run: AtomicBool::new(false),
                failure: Mutex::new(None),
                restarts: AtomicU32::new(0),
            }),
            bus: bus.clone(),
            policy,
            factory: Arc::new(factory),
            thread: Mutex::new(None),
        }
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ServiceState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            shared: self.shared.clone(),
        }
    }

    /// Message of the most recent failure, if any.
    pub fn failure_cause(&self) -> Option<String> {
        self.shared
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn restart_count(&self) -> u32 {
        self.shared.restarts.load(Ordering::Acquire)
    }

    /// Spawn the supervising thread. A service starts at most once.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ServiceState::New {
                return Err(PipeflowError::Service(format!(
                    "{} cannot start while {}",
                    self.shared.name, *state
                )));
            }
            *state = ServiceState::Running;
        }
        self.shared.should_run.store(true, Ordering::Release);

        let shared = self.shared.clone();
        let bus = self.bus.clone();
        let policy = self.policy;
        let factory = self.factory.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || supervise(shared, bus, policy, factory));

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(ServiceState::Failed);
                Err(PipeflowError::Io(e).with_context(format!("spawning {}", self.shared.name)))
            }
        }
    }

    /// Ask the loop to finish after its current iteration.
    pub fn stop(&self) {
        self.shared.should_run.store(false, Ordering::Release);
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ServiceState::Running => *state = ServiceState::Stopping,
            ServiceState::New => *state = ServiceState::Terminated,
            _ => {}
        }
    }

    /// Block until the supervising thread exits.
    pub fn await_terminated(&self) -> Result<()> {
        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.join().map_err(|payload| {
                PipeflowError::Service(format!(
                    "{} supervisor panicked: {}",
                    self.shared.name,
                    panic_message(payload.as_ref())
                ))
            })?;
        }
        Ok(())
    }

    pub fn stop_and_wait(&self) -> Result<()> {
        self.stop();
        self.await_terminated()
    }
}

impl fmt::Debug for AutoRestartingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRestartingService")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("restarts", &self.restart_count())
            .field("policy", &self.policy)
            .finish()
    }
}

fn supervise(shared: Arc<Shared>, bus: EventBus, policy: RestartPolicy, factory: Arc<IterationFactory>) {
    tracing::info!("{} started", shared.name);
    let handle = ServiceHandle {
        shared: shared.clone(),
    };

    loop {
        let mut iteration = factory();
        let failure = loop {
            if !handle.is_running() {
                break None;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| iteration(&handle))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => break Some(format!("{e:#}")),
                Err(payload) => break Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            }
        };

        let Some(message) = failure else {
            shared.set_state(ServiceState::Terminated);
            tracing::info!("{} terminated", shared.name);
            return;
        };

        tracing::error!("{} failed: {}", shared.name, message);
        *shared.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
        bus.post(Event::UnexpectedFailure {
            service: shared.name.clone(),
            message,
        });

        if !shared.should_run.load(Ordering::Acquire) {
            shared.set_state(ServiceState::Terminated);
            return;
        }
        let restarts = shared.restarts.load(Ordering::Acquire);
        if !policy.should_restart(restarts) {
            shared.set_state(ServiceState::Failed);
            tracing::error!("{} gave up after {} restarts", shared.name, restarts);
            return;
        }
        shared.restarts.fetch_add(1, Ordering::AcqRel);
        if !policy.backoff.is_zero() {
            thread::sleep(policy.backoff);
        }
        tracing::warn!("Restarting {} (restart {})", shared.name, restarts + 1);
    }
}
