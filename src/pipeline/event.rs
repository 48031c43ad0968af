//! Notifications exchanged over the [`EventBus`](crate::pipeline::bus::EventBus).
//!
//! Inbound events (step/source/connection structure, run and benchmark
//! requests) are posted by whatever edits the graph. Outbound events (socket
//! changes, run lifecycle, witness reports, timings) are posted by the core
//! for the UI and publishers.

use crate::pipeline::connection::Connection;
use crate::pipeline::id::{SourceId, StepId};
use crate::pipeline::socket::{Direction, Socket};
use crate::pipeline::source::SourceEntry;
use crate::pipeline::step::Step;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which entity a witness report or a timing belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Step(StepId),
    Source(SourceId),
    /// The scheduler itself, e.g. the time of a whole pass.
    Runner,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Step(id) => write!(f, "{}", id),
            Origin::Source(id) => write!(f, "{}", id),
            Origin::Runner => write!(f, "runner"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Exception,
}

/// Payload of [`Event::ExceptionFlagged`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionReport {
    pub origin: Origin,
    pub message: String,
    /// Rendered error chain of the underlying failure, if any.
    pub cause: Option<String>,
    pub severity: Severity,
}

/// Everything that travels over the bus.
#[derive(Clone)]
pub enum Event {
    // ── Inbound: structure ──
    StepAdded {
        step: Arc<Step>,
        /// `None` appends to the end of the pipeline.
        index: Option<usize>,
    },
    StepRemoved(Arc<Step>),
    StepMoved {
        step: Arc<Step>,
        delta: isize,
    },
    SourceAdded(Arc<SourceEntry>),
    SourceRemoved(Arc<SourceEntry>),
    ConnectionAdded(Arc<Connection>),
    ConnectionRemoved(Arc<Connection>),

    // ── Inbound: scheduling ──
    RunRequested {
        should_run: bool,
    },
    StopRequested,
    BenchmarkStarted,
    BenchmarkStopped,

    // ── Outbound: sockets ──
    SocketChanged(Arc<Socket>),
    SocketConnectivityChanged(Arc<Socket>),
    SocketPreviewChanged(Arc<Socket>),

    // ── Outbound: runner ──
    RunStarted,
    RunStopped,
    Render,

    // ── Outbound: diagnostics ──
    ExceptionFlagged(ExceptionReport),
    ExceptionCleared {
        origin: Origin,
    },
    Timed {
        target: Origin,
        elapsed: Duration,
    },
    UnexpectedFailure {
        service: String,
        message: String,
    },
}

/// Field-less mirror of [`Event`], used to index handler lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StepAdded,
    StepRemoved,
    StepMoved,
    SourceAdded,
    SourceRemoved,
    ConnectionAdded,
    ConnectionRemoved,
    RunRequested,
    StopRequested,
    BenchmarkStarted,
    BenchmarkStopped,
    SocketChanged,
    SocketConnectivityChanged,
    SocketPreviewChanged,
    RunStarted,
    RunStopped,
    Render,
    ExceptionFlagged,
    ExceptionCleared,
    Timed,
    UnexpectedFailure,
}

impl EventKind {
    /// Structural kinds; any of these changes what the next pass computes.
    pub const STRUCTURAL: &'static [EventKind] = &[
        EventKind::StepAdded,
        EventKind::StepRemoved,
        EventKind::StepMoved,
        EventKind::SourceAdded,
        EventKind::SourceRemoved,
        EventKind::ConnectionAdded,
        EventKind::ConnectionRemoved,
    ];
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StepAdded { .. } => EventKind::StepAdded,
            Event::StepRemoved(_) => EventKind::StepRemoved,
            Event::StepMoved { .. } => EventKind::StepMoved,
            Event::SourceAdded(_) => EventKind::SourceAdded,
            Event::SourceRemoved(_) => EventKind::SourceRemoved,
            Event::ConnectionAdded(_) => EventKind::ConnectionAdded,
            Event::ConnectionRemoved(_) => EventKind::ConnectionRemoved,
            Event::RunRequested { .. } => EventKind::RunRequested,
            Event::StopRequested => EventKind::StopRequested,
            Event::BenchmarkStarted => EventKind::BenchmarkStarted,
            Event::BenchmarkStopped => EventKind::BenchmarkStopped,
            Event::SocketChanged(_) => EventKind::SocketChanged,
            Event::SocketConnectivityChanged(_) => EventKind::SocketConnectivityChanged,
            Event::SocketPreviewChanged(_) => EventKind::SocketPreviewChanged,
            Event::RunStarted => EventKind::RunStarted,
            Event::RunStopped => EventKind::RunStopped,
            Event::Render => EventKind::Render,
            Event::ExceptionFlagged(_) => EventKind::ExceptionFlagged,
            Event::ExceptionCleared { .. } => EventKind::ExceptionCleared,
            Event::Timed { .. } => EventKind::Timed,
            Event::UnexpectedFailure { .. } => EventKind::UnexpectedFailure,
        }
    }

    /// Whether this event should wake the scheduler.
    ///
    /// A changed input socket only counts while it is unconnected: connected
    /// inputs are fed by upstream steps inside the pass itself.
    pub fn requests_run(&self) -> bool {
        match self {
            Event::RunRequested { should_run } => *should_run,
            Event::SocketChanged(socket) => {
                socket.direction() == Direction::Input && !socket.is_connected()
            }
            other => EventKind::STRUCTURAL.contains(&other.kind()),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::StepAdded { step, index } => f
                .debug_struct("StepAdded")
                .field("step", &step.id())
                .field("index", index)
                .finish(),
            Event::StepRemoved(step) => f.debug_tuple("StepRemoved").field(&step.id()).finish(),
            Event::StepMoved { step, delta } => f
                .debug_struct("StepMoved")
                .field("step", &step.id())
                .field("delta", delta)
                .finish(),
            Event::SourceAdded(source) => {
                f.debug_tuple("SourceAdded").field(&source.id()).finish()
            }
            Event::SourceRemoved(source) => {
                f.debug_tuple("SourceRemoved").field(&source.id()).finish()
            }
            Event::ConnectionAdded(c) => f.debug_tuple("ConnectionAdded").field(&c.id()).finish(),
            Event::ConnectionRemoved(c) => {
                f.debug_tuple("ConnectionRemoved").field(&c.id()).finish()
            }
            Event::SocketChanged(s) => f.debug_tuple("SocketChanged").field(&s.uid()).finish(),
            Event::SocketConnectivityChanged(s) => f
                .debug_tuple("SocketConnectivityChanged")
                .field(&s.uid())
                .finish(),
            Event::SocketPreviewChanged(s) => f
                .debug_tuple("SocketPreviewChanged")
                .field(&s.uid())
                .finish(),
            Event::RunRequested { should_run } => f
                .debug_struct("RunRequested")
                .field("should_run", should_run)
                .finish(),
            Event::ExceptionFlagged(report) => {
                f.debug_tuple("ExceptionFlagged").field(report).finish()
            }
            Event::ExceptionCleared { origin } => f
                .debug_struct("ExceptionCleared")
                .field("origin", origin)
                .finish(),
            Event::Timed { target, elapsed } => f
                .debug_struct("Timed")
                .field("target", target)
                .field("elapsed", elapsed)
                .finish(),
            Event::UnexpectedFailure { service, message } => f
                .debug_struct("UnexpectedFailure")
                .field("service", service)
                .field("message", message)
                .finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}
