//! pipeflow demo entry point.
//!
//! Builds two chained `Add` steps, feeds them from the calling thread and
//! prints the value the background runner computes.

use anyhow::Context;
use pipeflow::{
    config::{default_settings_path, Settings},
    logging,
    pipeline::{
        nodes, EventBus, EventKind, OperationRegistry, Origin, Pipeline, PipelineBridge,
        PipelineRunner, StepFactory, TimingCollector,
    },
};
use std::time::{Duration, Instant};

const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let settings = default_settings_path()
        .map(Settings::load_or_default)
        .unwrap_or_default();
    let _log_guard = logging::init(&settings.logging)?;

    tracing::info!("Starting pipeflow");

    let registry = OperationRegistry::new();
    nodes::register_builtin(&registry)?;
    let palette: Vec<_> = registry
        .operations()
        .iter()
        .map(|op| op.description().clone())
        .collect();
    tracing::debug!("Operations: {}", serde_json::to_string(&palette)?);

    let bus = EventBus::new();
    let pipeline = Pipeline::new(&bus);
    let timings = TimingCollector::attach(&bus, settings.metrics.history_len);
    let factory = StepFactory::new(&bus);
    let add = registry.get("Add").context("Add is not registered")?;

    let first = factory.create(&add)?;
    let second = factory.create(&add)?;
    pipeline.add_step(first.clone())?;
    pipeline.add_step(second.clone())?;

    let sum = first.output("result").context("missing output")?;
    let chained = second.input("a").context("missing input")?;
    pipeline.connect(sum, chained)?;

    let (bridge, _endpoint) = PipelineBridge::attach(&bus, &[EventKind::RunStopped]);
    let runner = PipelineRunner::new(&pipeline, &settings.runner);
    runner.start()?;

    first.input("a").context("missing input")?.set(123.0f64)?;
    first.input("b").context("missing input")?.set(456.0f64)?;
    second.input("b").context("missing input")?.set(789.0f64)?;

    let output = second.output("result").context("missing output")?;
    let deadline = Instant::now() + RESULT_TIMEOUT;
    let mut result = output.get::<f64>();
    while result != Some(1368.0) && Instant::now() < deadline {
        bridge.recv_timeout(Duration::from_millis(50));
        result = output.get::<f64>();
    }

    match result {
        Some(value) => println!("(123 + 456) + 789 = {}", value),
        None => println!("no result"),
    }
    tracing::info!("Finished after {} passes", runner.pass_count());
    for step in [&first, &second] {
        let stats = timings.statistics(Origin::Step(step.id()));
        tracing::debug!("{} timings (us): {}", step.id(), serde_json::to_string(&stats)?);
    }
    let passes = timings.statistics(Origin::Runner);
    tracing::debug!("Pass timings (us): {}", serde_json::to_string(&passes)?);

    runner.stop_and_wait()?;
    Ok(())
}
