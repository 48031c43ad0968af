//! Per-entity failure reporting.
//!
//! Each step and source owns an [`ExceptionWitness`]. Failures are flagged on
//! the witness instead of unwinding into the scheduler; the witness turns them
//! into [`Event::ExceptionFlagged`] and, once things recover,
//! [`Event::ExceptionCleared`].

use crate::pipeline::bus::EventBus;
use crate::pipeline::event::{Event, ExceptionReport, Origin, Severity};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ExceptionWitness {
    origin: Origin,
    bus: EventBus,
    flagged: AtomicBool,
}

impl ExceptionWitness {
    pub fn new(origin: Origin, bus: &EventBus) -> Self {
        Self {
            origin,
            bus: bus.clone(),
            flagged: AtomicBool::new(false),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Report a failure with its underlying cause.
    pub fn flag_exception(&self, message: impl Into<String>, cause: &anyhow::Error) {
        self.flag(message.into(), Some(format!("{:#}", cause)), Severity::Exception);
    }

    /// Report a recoverable problem that has no underlying error.
    pub fn flag_warning(&self, message: impl Into<String>) {
        self.flag(message.into(), None, Severity::Warning);
    }

    fn flag(&self, message: String, cause: Option<String>, severity: Severity) {
        self.flagged.store(true, Ordering::Release);
        self.bus.post(Event::ExceptionFlagged(ExceptionReport {
            origin: self.origin,
            message,
            cause,
            severity,
        }));
    }

    /// Clear a previous report. Only posts if something was flagged.
    pub fn clear_exception(&self) {
        if self
            .flagged
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.bus.post(Event::ExceptionCleared {
                origin: self.origin,
            });
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged.load(Ordering::Acquire)
    }
}
