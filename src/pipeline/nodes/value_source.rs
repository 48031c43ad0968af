//! ValueSource: a source fed from outside the pipeline.
//!
//! Values handed to [`ValueSource::set`] are held until the next refresh, then
//! written to the `value` output. Setting a value also asks the runner for a
//! pass, so a new value is picked up without any other trigger.

use crate::error::Result;
use crate::pipeline::bus::EventBus;
use crate::pipeline::event::Event;
use crate::pipeline::hint::SocketHint;
use crate::pipeline::socket::Socket;
use crate::pipeline::source::Source;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

struct Shared<T> {
    name: String,
    outputs: Vec<Arc<Socket>>,
    pending: Mutex<Option<T>>,
    bus: EventBus,
}

/// Cloning yields another handle to the same source.
pub struct ValueSource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ValueSource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> ValueSource<T>
where
    T: Any + Clone + Send + Sync,
{
    pub fn new(name: impl Into<String>, initial: T, bus: &EventBus) -> Result<Self> {
        let hint = SocketHint::builder::<T>("value")
            .initial_value(initial)
            .publishable(true)
            .build()?;
        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                outputs: vec![Socket::output(hint, bus)?],
                pending: Mutex::new(None),
                bus: bus.clone(),
            }),
        })
    }

    /// Queue `value` for the next refresh and request a pass.
    pub fn set(&self, value: T) {
        *self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
        self.shared.bus.post(Event::RunRequested { should_run: true });
    }

    pub fn output(&self) -> &Arc<Socket> {
        &self.shared.outputs[0]
    }
}

impl<T> Source for ValueSource<T>
where
    T: Any + Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.shared.outputs
    }

    fn refresh(&self) -> anyhow::Result<bool> {
        let pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(value) => {
                self.output().set(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
