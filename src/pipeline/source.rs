//! Sources: producers of values from outside the graph.
//!
//! A [`Source`] implementation only knows how to fill its output sockets.
//! [`SourceEntry`] gives it an identity in the pipeline, marks socket
//! ownership and turns refresh failures into witness reports.

use crate::error::Result;
use crate::pipeline::bus::{panic_message, EventBus};
use crate::pipeline::event::Origin;
use crate::pipeline::id::SourceId;
use crate::pipeline::socket::{Owner, Socket};
use crate::pipeline::witness::ExceptionWitness;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn output_sockets(&self) -> &[Arc<Socket>];

    /// Pull fresh data into the output sockets. `Ok(true)` if anything new arrived.
    fn refresh(&self) -> anyhow::Result<bool>;

    /// Fallible setup, run by whoever loads the source before it takes part in passes.
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn clean_up(&self) {}
}

pub struct SourceEntry {
    id: SourceId,
    source: Box<dyn Source>,
    witness: ExceptionWitness,
    removed: AtomicBool,
}

impl SourceEntry {
    pub fn new(source: Box<dyn Source>, bus: &EventBus) -> Result<Arc<Self>> {
        let id = SourceId::next();
        for socket in source.output_sockets() {
            socket.set_owner(Owner::Source(id))?;
        }
        tracing::debug!("Created {} for source '{}'", id, source.name());
        Ok(Arc::new(Self {
            id,
            witness: ExceptionWitness::new(Origin::Source(id), bus),
            source,
            removed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn output_sockets(&self) -> &[Arc<Socket>] {
        self.source.output_sockets()
    }

    pub fn output(&self, identifier: &str) -> Option<&Arc<Socket>> {
        self.output_sockets()
            .iter()
            .find(|s| s.identifier() == identifier)
    }

    pub fn witness(&self) -> &ExceptionWitness {
        &self.witness
    }

    /// Run the source's setup, reporting failure on the witness as well.
    pub fn initialize(&self) -> anyhow::Result<()> {
        match self.source.initialize() {
            Ok(()) => {
                self.witness.clear_exception();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} ('{}') failed to initialize: {:#}", self.id, self.name(), e);
                self.witness
                    .flag_exception(format!("{} could not be initialized.", self.name()), &e);
                Err(e)
            }
        }
    }

    /// Refresh the outputs. Failures are flagged, never propagated.
    pub fn update_output_sockets(&self) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.source.refresh()))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "refresh panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });
        match outcome {
            Ok(updated) => {
                self.witness.clear_exception();
                updated
            }
            Err(e) => {
                tracing::error!("{} ('{}') failed to refresh: {:#}", self.id, self.name(), e);
                self.witness
                    .flag_exception(format!("{} failed to update.", self.name()), &e);
                false
            }
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Clean up the wrapped source once.
    pub fn set_removed(&self) {
        if !self.removed.swap(true, Ordering::AcqRel) {
            self.source.clean_up();
        }
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}
