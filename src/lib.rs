//! # pipeflow: reactive dataflow pipeline core
//!
//! A directed graph of sources, steps and connections that is re-evaluated
//! on a dedicated thread whenever its structure or an edited input changes.
//! Each step reports success or failure through its own witness, and a
//! failing step never takes the rest of the pass down with it.
//!
//! ## Architecture
//!
//! - **Pipeline**: ordered steps, sources and connections, mutated through bus notifications
//! - **Runner**: supervised scheduler thread with coalesced wake-ups
//! - **Registry**: the palette of operations a user can add
//! - **Bridge**: crossbeam channels to consumers on other threads
//!
//! ## Configuration
//!
//! Settings are read from `settings.toml` in the platform config directory
//! (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use pipeflow::config::Settings;
//! use pipeflow::pipeline::{nodes, EventBus, OperationRegistry, Pipeline, PipelineRunner, StepFactory};
//!
//! let settings = Settings::default();
//! let bus = EventBus::new();
//! let pipeline = Pipeline::new(&bus);
//! let registry = OperationRegistry::new();
//! nodes::register_builtin(&registry)?;
//!
//! let add = registry.get("Add").unwrap();
//! let step = StepFactory::new(&bus).create(&add)?;
//! pipeline.add_step(step.clone())?;
//!
//! let runner = PipelineRunner::new(&pipeline, &settings.runner);
//! runner.start()?;
//! step.input("a").unwrap().set(2.0f64)?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use config::Settings;
pub use error::{PipeflowError, Result, ResultExt};
pub use pipeline::{EventBus, Pipeline, PipelineRunner};
