//! The operation palette.
//!
//! Every operation a user can add to a pipeline is registered here once.
//! Registration checks that the name and aliases are free and that a fresh
//! instance has well-formed sockets; the instance used for the check is
//! cleaned up and thrown away.

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::EventBus;
use crate::pipeline::operation::{Category, Operation, OperationMetaData};
use crate::pipeline::socket::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct Entries {
    operations: Vec<OperationMetaData>,
    /// Name or alias to index in `operations`.
    names: HashMap<String, usize>,
}

impl Entries {
    fn check_free(&self, names: &[String]) -> Result<()> {
        match names.iter().find(|n| self.names.contains_key(n.as_str())) {
            Some(taken) => Err(PipeflowError::DuplicateOperation(taken.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct OperationRegistry {
    entries: RwLock<Entries>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `metadata` to the palette.
    pub fn register(&self, metadata: OperationMetaData) -> Result<()> {
        let name = metadata.name().to_string();
        let mut own_names: Vec<String> = Vec::new();
        for candidate in metadata.description().all_names() {
            if own_names.iter().any(|n| n == candidate) {
                return Err(PipeflowError::DuplicateOperation(candidate.to_string()));
            }
            own_names.push(candidate.to_string());
        }

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.check_free(&own_names)?;
        }

        let instance = metadata.instantiate(&EventBus::new())?;
        let checked = validate_sockets(&name, instance.as_ref());
        instance.clean_up();
        checked?;

        // Another thread may have taken a name while the lock was released.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.check_free(&own_names)?;
        let index = entries.operations.len();
        for own in own_names {
            entries.names.insert(own, index);
        }
        entries.operations.push(metadata);
        tracing::debug!("Registered operation '{}'", name);
        Ok(())
    }

    /// Look up by name or alias.
    pub fn get(&self, name: &str) -> Option<OperationMetaData> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .names
            .get(name)
            .map(|&index| entries.operations[index].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .contains_key(name)
    }

    /// All operations in registration order.
    pub fn operations(&self) -> Vec<OperationMetaData> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .operations
            .clone()
    }

    pub fn by_category(&self, category: Category) -> Vec<OperationMetaData> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .operations
            .iter()
            .filter(|m| m.description().category() == category)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .operations
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_sockets(name: &str, operation: &dyn Operation) -> Result<()> {
    for (direction, sockets) in [
        (Direction::Input, operation.input_sockets()),
        (Direction::Output, operation.output_sockets()),
    ] {
        let mut seen = HashSet::new();
        for socket in sockets {
            if !seen.insert(socket.identifier()) {
                return Err(PipeflowError::DuplicateSocketIdentifier {
                    operation: name.to_string(),
                    direction,
                    identifier: socket.identifier().to_string(),
                });
            }
        }
    }

    let mut uids = HashSet::new();
    for socket in operation
        .input_sockets()
        .iter()
        .chain(operation.output_sockets())
    {
        if !uids.insert(socket.uid()) {
            return Err(PipeflowError::DuplicateSocketUid {
                operation: name.to_string(),
                uid: socket.uid(),
            });
        }
    }
    Ok(())
}
