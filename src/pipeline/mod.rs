//! Dataflow pipeline core.
//!
//! Values flow from sources through connections into steps, whose operations
//! write new values to their outputs, which connections carry further
//! downstream. A dedicated runner thread drives one pass over the graph each
//! time something asks for it.
//!
//! # Architecture
//!
//! ```text
//! [Source] ─► OutputSocket ─► Connection ─► InputSocket ─► [Step: Operation]
//!                                                               │
//!                     InputSocket ◄─ Connection ◄─ OutputSocket ◄┘
//! ```
//!
//! # Design
//!
//! - **Notifications drive structure**: the [`Pipeline`] only changes its
//!   step, source and connection lists from its own [`EventBus`] handlers.
//! - **Synchronous bus**: a post returns once every handler has run, so a
//!   value written to an output has reached every connected input by then.
//! - **Dirty tracking**: a step performs only when an input changed since its
//!   last run, unless the run is forced (benchmarking).
//! - **Contained failures**: an operation error or panic resets that step's
//!   outputs and is reported through its [`ExceptionWitness`].
//! - **Coalesced wake-ups**: any number of run requests during a pass cost
//!   exactly one more pass.
//! - **Supervised runner**: a failing pass loop is rebuilt by an
//!   [`AutoRestartingService`].

pub mod bridge;
pub mod bus;
pub mod connection;
pub mod event;
pub mod graph;
pub mod hint;
pub mod id;
pub mod metrics;
pub mod nodes;
pub mod operation;
pub mod registry;
pub mod runner;
pub mod service;
pub mod signal;
pub mod socket;
pub mod source;
pub mod step;
pub mod witness;

pub use bridge::{BridgeEndpoint, PipelineBridge, PipelineCommand};
pub use bus::{EventBus, Subscriber, SubscriberKey};
pub use connection::{Connection, ConnectionValidator, DefaultConnectionValidator};
pub use event::{Event, EventKind, ExceptionReport, Origin, Severity};
pub use graph::{Pipeline, StepIndexer};
pub use hint::{SocketHint, SocketHintBuilder, Value, ValueType, View};
pub use id::{ConnectionId, SocketId, SourceId, StepId};
pub use metrics::{Statistics, Timer, TimingCollector};
pub use nodes::{register_builtin, ValueSource};
pub use operation::{Category, Operation, OperationDescription, OperationMetaData};
pub use registry::OperationRegistry;
pub use runner::PipelineRunner;
pub use service::{AutoRestartingService, RestartPolicy, ServiceState};
pub use signal::WakeSignal;
pub use socket::{Direction, Owner, Socket};
pub use source::{Source, SourceEntry};
pub use step::{Step, StepFactory};
pub use witness::ExceptionWitness;
