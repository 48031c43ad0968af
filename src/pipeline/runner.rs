//! Pipeline runner: the scheduler thread.
//!
//! The runner sleeps on a [`WakeSignal`] and runs one graph pass per permit.
//! Anything that changes the graph or a directly edited input releases the
//! signal; releases that arrive while a pass is running collapse into one
//! follow-up pass.
//!
//! ```text
//!   RunRequested / structural / edit ──► WakeSignal ──► tick
//!                                                        │
//!            RunStarted ◄── sources, then steps ◄────────┘
//!            RunStopped, Render
//! ```
//!
//! The tick loop is supervised by an [`AutoRestartingService`]: an error or
//! panic escaping a tick is reported and the loop is rebuilt.

use crate::config::RunnerSettings;
use crate::error::Result;
use crate::pipeline::bus::{EventBus, Subscriber};
use crate::pipeline::event::{Event, EventKind, Origin};
use crate::pipeline::graph::Pipeline;
use crate::pipeline::metrics::Timer;
use crate::pipeline::service::{AutoRestartingService, Iteration, ServiceHandle, ServiceState};
use crate::pipeline::signal::WakeSignal;
use crate::pipeline::source::SourceEntry;
use crate::pipeline::step::Step;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Snapshot<T> = dyn Fn() -> Vec<Arc<T>> + Send + Sync;

/// State shared between the runner handle and the tick loop.
struct RunnerCore {
    bus: EventBus,
    sources: Box<Snapshot<SourceEntry>>,
    steps: Box<Snapshot<Step>>,
    signal: WakeSignal,
    benchmarking: AtomicBool,
    timer: Timer,
    passes: AtomicU64,
}

impl RunnerCore {
    fn tick(&self, handle: &ServiceHandle) -> anyhow::Result<()> {
        self.signal.acquire();
        if !handle.is_running() {
            return Ok(());
        }

        self.bus.post(Event::RunStarted);
        self.timer.time(|| self.run_pass(|| handle.is_running()))?;
        self.bus.post(Event::RunStopped);

        if handle.is_running() {
            self.bus.post(Event::Render);
        }
        Ok(())
    }

    fn run_pass(&self, is_running: impl Fn() -> bool) {
        let sources = (self.sources)();
        let steps = (self.steps)();
        let benchmarking = self.benchmarking.load(Ordering::Acquire);

        if !benchmarking {
            for source in &sources {
                if !is_running() {
                    return;
                }
                source.update_output_sockets();
            }
        }

        for step in &steps {
            if !is_running() {
                return;
            }
            step.run_perform(benchmarking);
        }
        self.passes.fetch_add(1, Ordering::AcqRel);
    }
}

pub struct PipelineRunner {
    core: Arc<RunnerCore>,
    service: AutoRestartingService,
}

impl PipelineRunner {
    /// Runner over the live contents of `pipeline`.
    pub fn new(pipeline: &Arc<Pipeline>, settings: &RunnerSettings) -> Arc<Self> {
        let sources = pipeline.clone();
        let steps = pipeline.clone();
        Self::with_snapshots(
            pipeline.bus(),
            settings,
            move || sources.sources(),
            move || steps.steps(),
        )
    }

    /// Runner over arbitrary snapshot functions, called at the start of every pass.
    pub fn with_snapshots<S, T>(
        bus: &EventBus,
        settings: &RunnerSettings,
        sources: S,
        steps: T,
    ) -> Arc<Self>
    where
        S: Fn() -> Vec<Arc<SourceEntry>> + Send + Sync + 'static,
        T: Fn() -> Vec<Arc<Step>> + Send + Sync + 'static,
    {
        let core = Arc::new(RunnerCore {
            bus: bus.clone(),
            sources: Box::new(sources),
            steps: Box::new(steps),
            signal: WakeSignal::new(),
            benchmarking: AtomicBool::new(settings.start_in_benchmark_mode),
            timer: Timer::new(Origin::Runner, bus),
            passes: AtomicU64::new(0),
        });

        let factory = {
            let core = core.clone();
            move || -> Iteration {
                let core = core.clone();
                Box::new(move |handle: &ServiceHandle| core.tick(handle))
            }
        };
        let service = AutoRestartingService::new(
            "Pipeline Runner Service",
            bus,
            settings.restart_policy(),
            factory,
        )
        .with_thread_name(settings.thread_name.clone());

        let runner = Arc::new(Self { core, service });
        bus.register(&runner);
        runner
    }

    /// Start the scheduler thread.
    pub fn start(&self) -> Result<()> {
        self.service.start()?;
        tracing::info!("Pipeline runner started");
        Ok(())
    }

    /// Stop after the current pass. Also wakes a tick blocked on the signal.
    pub fn stop(&self) {
        self.service.stop();
        self.core.signal.release();
    }

    pub fn stop_and_wait(&self) -> Result<()> {
        self.stop();
        self.service.await_terminated()?;
        tracing::info!("Pipeline runner stopped");
        Ok(())
    }

    pub fn state(&self) -> ServiceState {
        self.service.state()
    }

    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }

    pub fn failure_cause(&self) -> Option<String> {
        self.service.failure_cause()
    }

    /// Wake the scheduler for one more pass.
    pub fn request_run(&self) {
        self.core.signal.release();
    }

    /// Run one pass on the calling thread, polling `is_running` between
    /// sources and between steps.
    pub fn run_pass(&self, is_running: impl Fn() -> bool) {
        self.core.run_pass(is_running);
    }

    /// Run one complete pass on the calling thread.
    pub fn run_once(&self) {
        self.core.run_pass(|| true);
    }

    pub fn is_benchmarking(&self) -> bool {
        self.core.benchmarking.load(Ordering::Acquire)
    }

    /// Passes completed so far, on any thread.
    pub fn pass_count(&self) -> u64 {
        self.core.passes.load(Ordering::Acquire)
    }

    pub fn timer(&self) -> &Timer {
        &self.core.timer
    }
}

impl Subscriber for PipelineRunner {
    fn interests(&self) -> Vec<EventKind> {
        let mut kinds = vec![
            EventKind::RunRequested,
            EventKind::StopRequested,
            EventKind::BenchmarkStarted,
            EventKind::BenchmarkStopped,
            EventKind::SocketChanged,
        ];
        kinds.extend_from_slice(EventKind::STRUCTURAL);
        kinds
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        match event {
            Event::StopRequested => self.stop(),
            Event::BenchmarkStarted => {
                tracing::info!("Benchmarking started");
                self.core.benchmarking.store(true, Ordering::Release);
            }
            Event::BenchmarkStopped => {
                tracing::info!("Benchmarking stopped");
                self.core.benchmarking.store(false, Ordering::Release);
            }
            event if event.requests_run() => self.core.signal.release(),
            _ => {}
        }
    }
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("state", &self.state())
            .field("benchmarking", &self.is_benchmarking())
            .field("passes", &self.pass_count())
            .finish()
    }
}
