//! Thread boundary between the pipeline core and its consumers (UI, publishers).
//!
//! The bus delivers notifications synchronously on the posting thread. A
//! consumer that lives on another thread attaches a [`PipelineBridge`]: the
//! chosen event kinds are copied into a bounded channel it can drain at its
//! own pace, and commands it sends back are turned into bus posts by the
//! core-side [`BridgeEndpoint`].

use crate::pipeline::bus::{EventBus, SubscriberKey};
use crate::pipeline::event::{Event, EventKind};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Commands sent from a consumer thread to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Ask the runner for another pass.
    RequestRun,
    /// Stop the runner.
    Stop,
    /// Enter benchmarking mode.
    StartBenchmark,
    /// Leave benchmarking mode.
    StopBenchmark,
}

impl PipelineCommand {
    fn into_event(self) -> Event {
        match self {
            PipelineCommand::RequestRun => Event::RunRequested { should_run: true },
            PipelineCommand::Stop => Event::StopRequested,
            PipelineCommand::StartBenchmark => Event::BenchmarkStarted,
            PipelineCommand::StopBenchmark => Event::BenchmarkStopped,
        }
    }
}

/// Channel capacity for commands (consumer → pipeline).
const CMD_CHANNEL_CAPACITY: usize = 256;
/// Channel capacity for events (pipeline → consumer).
/// Events beyond this are dropped until the consumer drains.
const MSG_CHANNEL_CAPACITY: usize = 10_000;

/// Consumer-side handle.
pub struct PipelineBridge {
    pub cmd_tx: Sender<PipelineCommand>,
    pub msg_rx: Receiver<Event>,
}

/// Core-side half. Forwards events while alive; unsubscribes on drop.
pub struct BridgeEndpoint {
    bus: EventBus,
    cmd_rx: Receiver<PipelineCommand>,
    key: SubscriberKey,
}

impl PipelineBridge {
    /// Attach a bridge to `bus` that forwards events of the given kinds.
    pub fn attach(bus: &EventBus, kinds: &[EventKind]) -> (Self, BridgeEndpoint) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = bounded::<Event>(MSG_CHANNEL_CAPACITY);

        let key = bus.subscribe(kinds, move |event| {
            if msg_tx.try_send(event.clone()).is_err() {
                tracing::trace!("Bridge full, dropping {:?}", event.kind());
            }
        });

        let endpoint = BridgeEndpoint {
            bus: bus.clone(),
            cmd_rx,
            key,
        };
        (Self { cmd_tx, msg_rx }, endpoint)
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<Event> {
        self.msg_rx.try_iter().collect()
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<Event> {
        self.msg_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.msg_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn send_command(&self, cmd: PipelineCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn request_run(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::RequestRun);
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::Stop);
    }

    pub fn start_benchmark(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::StartBenchmark);
    }

    pub fn stop_benchmark(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::StopBenchmark);
    }
}

impl BridgeEndpoint {
    /// Post every pending command on the bus. Returns how many were applied.
    pub fn apply_commands(&self) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            tracing::debug!("Applying bridge command {:?}", cmd);
            self.bus.post(cmd.into_event());
            applied += 1;
        }
        applied
    }
}

impl Drop for BridgeEndpoint {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.key);
    }
}
