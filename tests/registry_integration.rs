//! Integration tests for the operation registry

mod common;

use common::builders::PassThroughBuilder;
use pipeflow::error::PipeflowError;
use pipeflow::pipeline::{
    nodes, Category, EventBus, OperationDescription, OperationRegistry, StepFactory,
};

#[test]
fn test_builtin_palette() {
    let registry = OperationRegistry::new();
    nodes::register_builtin(&registry).unwrap();

    let names: Vec<String> = registry
        .operations()
        .iter()
        .map(|op| op.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["Add", "Subtract", "Multiply", "Divide", "Switch", "Valve"]
    );
    assert_eq!(registry.by_category(Category::Miscellaneous).len(), 4);
    assert!(registry.by_category(Category::Network).is_empty());
}

#[test]
fn test_every_builtin_creates_a_step() {
    let registry = OperationRegistry::new();
    nodes::register_builtin(&registry).unwrap();
    let factory = StepFactory::new(&EventBus::new());

    for metadata in registry.operations() {
        let step = factory.create(&metadata).unwrap();
        assert_eq!(step.name(), metadata.name());
        assert!(!step.output_sockets().is_empty());
        step.run_perform(true);
        // Inputs default to zero, so only Divide fails.
        let divides = metadata.name() == "Divide";
        assert_eq!(step.witness().is_flagged(), divides, "{}", step.name());
    }
}

#[test]
fn test_duplicate_name_rejected() {
    let registry = OperationRegistry::new();
    registry.register(PassThroughBuilder::new("Copy").build()).unwrap();

    let err = registry
        .register(PassThroughBuilder::new("Copy").build())
        .unwrap_err();
    assert!(matches!(err, PipeflowError::DuplicateOperation(name) if name == "Copy"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_descriptions_serialize() {
    let registry = OperationRegistry::new();
    nodes::register_builtin(&registry).unwrap();
    let description = registry.get("Switch").unwrap().description().clone();

    let json = serde_json::to_string(&description).unwrap();
    let back: OperationDescription = serde_json::from_str(&json).unwrap();
    assert_eq!(back, description);
    assert_eq!(back.category(), Category::Logical);
}
