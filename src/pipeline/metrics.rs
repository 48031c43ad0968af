//! Timing of step performs and graph passes.
//!
//! [`Timer`] measures one target and posts [`Event::Timed`] each time it
//! stops. [`TimingCollector`] listens for those events and keeps a bounded
//! history per target, summarized with [`Statistics`].

use crate::error::{PipeflowError, Result};
use crate::pipeline::bus::{EventBus, Subscriber};
use crate::pipeline::event::{Event, EventKind, Origin};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default number of samples kept per timed target.
pub const DEFAULT_HISTORY_LEN: usize = 64;

struct TimerState {
    started_at: Option<Instant>,
    elapsed: Duration,
}

pub struct Timer {
    target: Origin,
    bus: EventBus,
    state: Mutex<TimerState>,
}

impl Timer {
    pub fn new(target: Origin, bus: &EventBus) -> Self {
        Self {
            target,
            bus: bus.clone(),
            state: Mutex::new(TimerState {
                started_at: None,
                elapsed: Duration::ZERO,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.state();
        if state.started_at.is_some() {
            return Err(PipeflowError::Timer(format!(
                "timer for {} already started",
                self.target
            )));
        }
        state.started_at = Some(Instant::now());
        Ok(())
    }

    /// Stop timing and post the elapsed time.
    pub fn stop(&self) -> Result<Duration> {
        let elapsed = {
            let mut state = self.state();
            let started_at = state.started_at.take().ok_or_else(|| {
                PipeflowError::Timer(format!("timer for {} is not running", self.target))
            })?;
            state.elapsed = started_at.elapsed();
            state.elapsed
        };
        self.bus.post(Event::Timed {
            target: self.target,
            elapsed,
        });
        Ok(elapsed)
    }

    pub fn reset(&self) {
        let mut state = self.state();
        state.started_at = None;
        state.elapsed = Duration::ZERO;
    }

    /// Time `f`. The timer is stopped even if `f` panics.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.start()?;
        let _guard = StopOnDrop(self);
        Ok(f())
    }

    /// Duration of the last completed measurement.
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    pub fn is_running(&self) -> bool {
        self.state().started_at.is_some()
    }
}

struct StopOnDrop<'a>(&'a Timer);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            tracing::warn!("{}", e);
        }
    }
}

/// Summary of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Statistics {
    pub num_samples: usize,
    pub sum: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub standard_deviation: f64,
}

impl Statistics {
    pub const NIL: Statistics = Statistics {
        num_samples: 0,
        sum: 0.0,
        mean: 0.0,
        standard_deviation: 0.0,
    };

    pub fn of(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::NIL;
        }
        let sum: f64 = samples.iter().sum();
        let mean = sum / n as f64;
        let variance = samples.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n as f64;
        Self {
            num_samples: n,
            sum,
            mean,
            standard_deviation: variance.sqrt(),
        }
    }

    /// Standard deviations above the mean, or zero at or below it.
    ///
    /// Meaningless with fewer than two samples, so zero there too.
    pub fn hotness(&self, value: f64) -> f64 {
        if self.num_samples < 2 || value <= self.mean || self.standard_deviation == 0.0 {
            return 0.0;
        }
        (value - self.mean) / self.standard_deviation
    }
}

/// Collects [`Event::Timed`] samples, in microseconds, per target.
pub struct TimingCollector {
    history_len: usize,
    samples: Mutex<HashMap<Origin, VecDeque<f64>>>,
}

impl TimingCollector {
    pub fn new(history_len: usize) -> Arc<Self> {
        Arc::new(Self {
            history_len: history_len.max(1),
            samples: Mutex::new(HashMap::new()),
        })
    }

    /// Create a collector and register it on `bus`.
    pub fn attach(bus: &EventBus, history_len: usize) -> Arc<Self> {
        let collector = Self::new(history_len);
        bus.register(&collector);
        collector
    }

    fn samples(&self) -> MutexGuard<'_, HashMap<Origin, VecDeque<f64>>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, target: Origin, elapsed: Duration) {
        let mut samples = self.samples();
        let history = samples.entry(target).or_default();
        if history.len() == self.history_len {
            history.pop_front();
        }
        history.push_back(elapsed.as_secs_f64() * 1_000_000.0);
    }

    pub fn statistics(&self, target: Origin) -> Statistics {
        self.samples()
            .get(&target)
            .map(|h| Statistics::of(&h.iter().copied().collect::<Vec<_>>()))
            .unwrap_or(Statistics::NIL)
    }

    pub fn sample_count(&self, target: Origin) -> usize {
        self.samples().get(&target).map_or(0, VecDeque::len)
    }

    pub fn targets(&self) -> Vec<Origin> {
        self.samples().keys().copied().collect()
    }

    pub fn clear(&self) {
        self.samples().clear();
    }
}

impl Subscriber for TimingCollector {
    fn interests(&self) -> Vec<EventKind> {
        vec![EventKind::Timed]
    }

    fn on_event(self: Arc<Self>, event: &Event) {
        if let Event::Timed { target, elapsed } = event {
            self.record(*target, *elapsed);
        }
    }
}
