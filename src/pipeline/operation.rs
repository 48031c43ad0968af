//! Operations and the metadata used to create them.
//!
//! An [`Operation`] is an opaque computation over its sockets. The core never
//! looks inside `perform`; it only reads the socket lists, calls `perform`
//! when a step decides to run and calls `clean_up` once when the step is
//! removed.

use crate::error::Result;
use crate::pipeline::bus::EventBus;
use crate::pipeline::event::{Event, EventKind};
use crate::pipeline::socket::Socket;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub trait Operation: Send + Sync {
    /// Input sockets, fixed for the lifetime of the operation.
    fn input_sockets(&self) -> &[Arc<Socket>];

    /// Output sockets, fixed for the lifetime of the operation.
    fn output_sockets(&self) -> &[Arc<Socket>];

    /// Read inputs, write outputs. Errors and panics are contained by the step.
    fn perform(&self) -> anyhow::Result<()>;

    /// Release resources. Called once, when the owning step is removed.
    fn clean_up(&self) {}

    /// Event kinds forwarded to [`Operation::on_event`] while the step is live.
    fn interests(&self) -> Vec<EventKind> {
        Vec::new()
    }

    fn on_event(&self, _event: &Event) {}
}

/// Palette grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    ImageProcessing,
    FeatureDetection,
    Network,
    Logical,
    OpenCv,
    #[default]
    Miscellaneous,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::ImageProcessing,
            Category::FeatureDetection,
            Category::Network,
            Category::Logical,
            Category::OpenCv,
            Category::Miscellaneous,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::ImageProcessing => "Image Processing",
            Category::FeatureDetection => "Feature Detection",
            Category::Network => "Network",
            Category::Logical => "Logical",
            Category::OpenCv => "OpenCV",
            Category::Miscellaneous => "Miscellaneous",
        }
    }
}

/// Display metadata of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescription {
    name: String,
    summary: String,
    category: Category,
    icon: Option<PathBuf>,
    aliases: BTreeSet<String>,
}

impl OperationDescription {
    pub const DEFAULT_SUMMARY: &'static str = "PLEASE PROVIDE A DESCRIPTION TO THE OPERATION";

    pub fn builder(name: impl Into<String>) -> OperationDescriptionBuilder {
        OperationDescriptionBuilder {
            name: name.into(),
            summary: Self::DEFAULT_SUMMARY.to_string(),
            category: Category::default(),
            icon: None,
            aliases: BTreeSet::new(),
        }
    }

    /// The unique user-facing name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn icon(&self) -> Option<&PathBuf> {
        self.icon.as_ref()
    }

    /// Former names that still resolve to this operation.
    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    /// Name followed by aliases.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

pub struct OperationDescriptionBuilder {
    name: String,
    summary: String,
    category: Category,
    icon: Option<PathBuf>,
    aliases: BTreeSet<String>,
}

impl OperationDescriptionBuilder {
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn build(self) -> OperationDescription {
        OperationDescription {
            name: self.name,
            summary: self.summary,
            category: self.category,
            icon: self.icon,
            aliases: self.aliases,
        }
    }
}

type Supplier = dyn Fn(&EventBus) -> Result<Box<dyn Operation>> + Send + Sync;

/// A description paired with a factory for fresh operation instances.
#[derive(Clone)]
pub struct OperationMetaData {
    description: OperationDescription,
    supplier: Arc<Supplier>,
}

impl OperationMetaData {
    pub fn new<F>(description: OperationDescription, supplier: F) -> Self
    where
        F: Fn(&EventBus) -> Result<Box<dyn Operation>> + Send + Sync + 'static,
    {
        Self {
            description,
            supplier: Arc::new(supplier),
        }
    }

    pub fn description(&self) -> &OperationDescription {
        &self.description
    }

    pub fn name(&self) -> &str {
        self.description.name()
    }

    /// Build a new operation whose sockets post to `bus`.
    pub fn instantiate(&self, bus: &EventBus) -> Result<Box<dyn Operation>> {
        (self.supplier)(bus)
    }
}

impl fmt::Debug for OperationMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMetaData")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
