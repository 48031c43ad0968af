//! Integration tests for pipeline evaluation
//!
//! These tests drive whole passes synchronously and check:
//! - Value propagation through connections
//! - Step ordering within a pass
//! - Failure containment and witness reporting
//! - Structural cleanup when steps and connections go away

mod common;

use common::builders::{run_log, Behavior, PassThroughBuilder};
use common::{assert_float_eq, record_events};
use pipeflow::config::RunnerSettings;
use pipeflow::pipeline::{
    nodes, Event, EventBus, EventKind, Origin, OperationRegistry, Pipeline, PipelineRunner,
    Severity, StepFactory,
};
use std::sync::Arc;

struct Fixture {
    bus: EventBus,
    pipeline: Arc<Pipeline>,
    factory: StepFactory,
    registry: OperationRegistry,
    runner: Arc<PipelineRunner>,
}

fn fixture() -> Fixture {
    let bus = EventBus::new();
    let pipeline = Pipeline::new(&bus);
    let registry = OperationRegistry::new();
    nodes::register_builtin(&registry).unwrap();
    let runner = PipelineRunner::new(&pipeline, &RunnerSettings::default());
    Fixture {
        factory: StepFactory::new(&bus),
        bus,
        pipeline,
        registry,
        runner,
    }
}

#[test]
fn test_chained_additions() {
    let f = fixture();
    let add = f.registry.get("Add").unwrap();
    let first = f.factory.create(&add).unwrap();
    let second = f.factory.create(&add).unwrap();
    f.pipeline.add_step(first.clone()).unwrap();
    f.pipeline.add_step(second.clone()).unwrap();
    f.pipeline
        .connect(first.output("result").unwrap(), second.input("a").unwrap())
        .unwrap();

    first.input("a").unwrap().set(123.0f64).unwrap();
    first.input("b").unwrap().set(456.0f64).unwrap();
    second.input("b").unwrap().set(789.0f64).unwrap();
    f.runner.run_once();

    assert_float_eq(first.output("result").unwrap().get::<f64>().unwrap(), 579.0, 1e-9);
    assert_float_eq(second.output("result").unwrap().get::<f64>().unwrap(), 1368.0, 1e-9);
}

#[test]
fn test_connection_pushes_existing_value() {
    let f = fixture();
    let add = f.registry.get("Add").unwrap();
    let upstream = f.factory.create(&add).unwrap();
    let downstream = f.factory.create(&add).unwrap();
    f.pipeline.add_step(upstream.clone()).unwrap();
    f.pipeline.add_step(downstream.clone()).unwrap();

    upstream.input("a").unwrap().set(2.0f64).unwrap();
    f.runner.run_once();
    assert_eq!(upstream.output("result").unwrap().get::<f64>(), Some(2.0));

    f.pipeline
        .connect(upstream.output("result").unwrap(), downstream.input("b").unwrap())
        .unwrap();
    assert_eq!(downstream.input("b").unwrap().get::<f64>(), Some(2.0));
}

#[test]
fn test_disconnect_resets_input() {
    let f = fixture();
    let multiply = f.registry.get("Multiply").unwrap();
    let upstream = f.factory.create(&multiply).unwrap();
    let downstream = f.factory.create(&multiply).unwrap();
    f.pipeline.add_step(upstream.clone()).unwrap();
    f.pipeline.add_step(downstream.clone()).unwrap();

    upstream.input("a").unwrap().set(3.0f64).unwrap();
    upstream.input("b").unwrap().set(4.0f64).unwrap();
    let connection = f
        .pipeline
        .connect(upstream.output("result").unwrap(), downstream.input("a").unwrap())
        .unwrap();
    f.runner.run_once();
    assert_eq!(downstream.input("a").unwrap().get::<f64>(), Some(12.0));

    f.pipeline.remove_connection(&connection);
    assert!(!connection.is_active());
    assert!(!downstream.input("a").unwrap().is_connected());
    assert_eq!(downstream.input("a").unwrap().get::<f64>(), Some(0.0));
}

#[test]
fn test_steps_run_in_pipeline_order() {
    let f = fixture();
    let log = run_log();
    let make = |name: &str| {
        f.factory
            .create(&PassThroughBuilder::new(name).log(&log).build())
            .unwrap()
    };
    let a = make("A");
    let b = make("B");
    let c = make("C");
    f.pipeline.add_step(c.clone()).unwrap();
    f.pipeline.add_step_at(0, a.clone()).unwrap();
    f.pipeline.add_step_between(b.clone(), Some(&*a), Some(&*c)).unwrap();

    f.runner.run_once();
    assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);

    // Nothing changed, nothing runs.
    f.runner.run_once();
    assert_eq!(log.lock().unwrap().len(), 3);

    f.pipeline.move_step(&a, 2).unwrap();
    b.input("in").unwrap().set(1.0f64).unwrap();
    c.input("in").unwrap().set(1.0f64).unwrap();
    a.input("in").unwrap().set(1.0f64).unwrap();
    f.runner.run_once();
    assert_eq!(log.lock().unwrap()[3..], ["B", "C", "A"]);
}

#[test]
fn test_failing_step_is_contained() {
    let f = fixture();
    let log = run_log();
    let first = f
        .factory
        .create(&PassThroughBuilder::new("First").log(&log).build())
        .unwrap();
    let broken = f
        .factory
        .create(
            &PassThroughBuilder::new("Broken")
                .log(&log)
                .behavior(Behavior::Fail)
                .build(),
        )
        .unwrap();
    let panicky = f
        .factory
        .create(
            &PassThroughBuilder::new("Panicky")
                .log(&log)
                .behavior(Behavior::Panic)
                .build(),
        )
        .unwrap();
    let last = f
        .factory
        .create(&PassThroughBuilder::new("Last").log(&log).build())
        .unwrap();
    for step in [&first, &broken, &panicky, &last] {
        f.pipeline.add_step(step.clone()).unwrap();
    }
    let reports = record_events(&f.bus, &[EventKind::ExceptionFlagged]);

    f.runner.run_once();

    assert_eq!(*log.lock().unwrap(), vec!["First", "Broken", "Panicky", "Last"]);
    assert!(broken.witness().is_flagged());
    assert!(panicky.witness().is_flagged());
    assert!(!last.witness().is_flagged());

    let reports = reports.lock().unwrap();
    let origins: Vec<Origin> = reports
        .iter()
        .filter_map(|event| match event {
            Event::ExceptionFlagged(report) => {
                assert_eq!(report.severity, Severity::Exception);
                assert!(report.cause.is_some());
                Some(report.origin)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        origins,
        vec![Origin::Step(broken.id()), Origin::Step(panicky.id())]
    );
}

#[test]
fn test_missing_input_is_a_warning() {
    let f = fixture();
    let step = f
        .factory
        .create(&PassThroughBuilder::new("Empty").without_initial_input().build())
        .unwrap();
    f.pipeline.add_step(step.clone()).unwrap();
    let reports = record_events(&f.bus, &[EventKind::ExceptionFlagged, EventKind::ExceptionCleared]);

    f.runner.run_once();
    assert!(step.witness().is_flagged());

    step.input("in").unwrap().set(5.0f64).unwrap();
    f.runner.run_once();
    assert!(!step.witness().is_flagged());
    assert_eq!(step.output("out").unwrap().get::<f64>(), Some(5.0));

    let reports = reports.lock().unwrap();
    assert!(matches!(
        &reports[0],
        Event::ExceptionFlagged(report) if report.severity == Severity::Warning
    ));
    assert!(matches!(reports[1], Event::ExceptionCleared { .. }));
}

#[test]
fn test_divide_by_zero_resets_result() {
    let f = fixture();
    let divide = f.registry.get("Divide").unwrap();
    let step = f.factory.create(&divide).unwrap();
    f.pipeline.add_step(step.clone()).unwrap();

    step.input("a").unwrap().set(9.0f64).unwrap();
    step.input("b").unwrap().set(3.0f64).unwrap();
    f.runner.run_once();
    assert_eq!(step.output("result").unwrap().get::<f64>(), Some(3.0));

    step.input("b").unwrap().set(0.0f64).unwrap();
    f.runner.run_once();
    assert!(step.witness().is_flagged());
    assert_eq!(step.output("result").unwrap().get::<f64>(), Some(0.0));
}

#[test]
fn test_removing_step_removes_its_connections() {
    let f = fixture();
    let add = f.registry.get("Add").unwrap();
    let a = f.factory.create(&add).unwrap();
    let b = f.factory.create(&add).unwrap();
    let c = f.factory.create(&add).unwrap();
    for step in [&a, &b, &c] {
        f.pipeline.add_step(step.clone()).unwrap();
    }
    f.pipeline
        .connect(a.output("result").unwrap(), b.input("a").unwrap())
        .unwrap();
    f.pipeline
        .connect(b.output("result").unwrap(), c.input("a").unwrap())
        .unwrap();
    assert_eq!(f.pipeline.connection_count(), 2);

    f.pipeline.remove_step(&b).unwrap();

    assert!(b.is_removed());
    assert_eq!(f.pipeline.step_count(), 2);
    assert_eq!(f.pipeline.connection_count(), 0);
    assert!(!a.output("result").unwrap().is_connected());
    assert!(!c.input("a").unwrap().is_connected());

    // A removed step never runs again.
    b.input("a").unwrap().set(1.0f64).unwrap();
    b.run_perform(true);
    assert_eq!(b.output("result").unwrap().get::<f64>(), Some(0.0));
}

#[test]
fn test_benchmark_pass_forces_every_step() {
    let f = fixture();
    let log = run_log();
    let step = f
        .factory
        .create(&PassThroughBuilder::new("Hot").log(&log).build())
        .unwrap();
    f.pipeline.add_step(step).unwrap();

    f.runner.run_once();
    f.runner.run_once();
    assert_eq!(log.lock().unwrap().len(), 1);

    f.bus.post(Event::BenchmarkStarted);
    assert!(f.runner.is_benchmarking());
    f.runner.run_once();
    f.runner.run_once();
    assert_eq!(log.lock().unwrap().len(), 3);

    f.bus.post(Event::BenchmarkStopped);
    f.runner.run_once();
    assert_eq!(log.lock().unwrap().len(), 3);
}
