//! Error handling for pipeflow
//!
//! Structural problems (bad connections, colliding registrations, misuse of
//! timers and services) are reported synchronously through [`PipeflowError`].
//! Failures inside an operation or a source never reach this type; they are
//! contained by the owning step or source and surfaced through its witness.

use crate::pipeline::id::{SocketId, StepId};
use crate::pipeline::socket::Direction;
use thiserror::Error;

/// Main error type for pipeflow operations
#[derive(Error, Debug)]
pub enum PipeflowError {
    /// A connection between two sockets was rejected by its validator
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// A value of the wrong type was written to a socket
    #[error("Type mismatch on socket '{socket}': expected {expected}, got {actual}")]
    TypeMismatch {
        socket: String,
        expected: &'static str,
        actual: String,
    },

    /// A socket already belongs to a different step or source
    #[error("Socket {socket} already has owner {current}")]
    OwnershipConflict { socket: SocketId, current: String },

    /// A socket hint could not be built
    #[error("Invalid socket hint '{identifier}': {message}")]
    InvalidHint { identifier: String, message: String },

    /// Output sockets always need something to reset to
    #[error("Output socket '{0}' requires an initial value")]
    MissingInitialValue(String),

    /// An operation name or alias is already registered
    #[error("An operation named '{0}' is already registered")]
    DuplicateOperation(String),

    /// Two sockets on the same side of an operation share an identifier
    #[error("Operation '{operation}' has duplicate {direction} socket identifier '{identifier}'")]
    DuplicateSocketIdentifier {
        operation: String,
        direction: Direction,
        identifier: String,
    },

    /// The same socket instance appears more than once in an operation
    #[error("Operation '{operation}' lists socket {uid} more than once")]
    DuplicateSocketUid { operation: String, uid: SocketId },

    /// The step is not part of the pipeline
    #[error("Step {0} is not in the pipeline")]
    StepNotFound(StepId),

    /// The step was removed and can no longer be used
    #[error("Step {0} has already been removed")]
    StepRemoved(StepId),

    /// Index outside the step list
    #[error("Index {index} out of bounds for {len} steps")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Timer started twice or stopped while idle
    #[error("Timer error: {0}")]
    Timer(String),

    /// Service started twice, thread spawn failures and similar
    #[error("Service error: {0}")]
    Service(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipeflowError>,
    },
}

impl PipeflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipeflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pipeflow operations
pub type Result<T> = std::result::Result<T, PipeflowError>;

/// Wraps a failed result in [`PipeflowError::WithContext`].
///
/// Works on any result whose error converts into [`PipeflowError`], so
/// `std::io::Result` picks up the path or action that failed on its way out.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the message only on failure.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipeflowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipeflowError::with_context(e.into(), context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipeflowError::with_context(e.into(), f()))
    }
}
