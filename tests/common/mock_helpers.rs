//! Mock construction helpers

use crossbeam_channel::{unbounded, Receiver};
use mockall::automock;
use pipeflow::pipeline::{EventBus, EventKind, Socket, SocketHint, Source};
use std::sync::Arc;

/// Receives one `()` per finished runner pass
pub fn pass_channel(bus: &EventBus) -> Receiver<()> {
    let (tx, rx) = unbounded();
    bus.subscribe(&[EventKind::RunStopped], move |_| {
        let _ = tx.send(());
    });
    rx
}

/// The fallible half of a [`Source`], mocked per test
#[automock]
pub trait Feed: Send + Sync {
    fn initialize(&self) -> anyhow::Result<()>;
    fn refresh(&self) -> anyhow::Result<bool>;
    fn clean_up(&self);
}

/// A source with one `f64` output named `value`, driven by a [`MockFeed`]
pub struct MockedSource {
    outputs: Vec<Arc<Socket>>,
    feed: MockFeed,
}

/// An `f64` output socket named `value` starting at `0.0`
pub fn number_output(bus: &EventBus) -> Arc<Socket> {
    let hint = SocketHint::builder::<f64>("value")
        .initial_value(0.0)
        .build()
        .unwrap();
    Socket::output(hint, bus).unwrap()
}

impl MockedSource {
    /// `output` is usually also captured by the feed's `refresh` expectation.
    pub fn new(output: Arc<Socket>, feed: MockFeed) -> Self {
        Self {
            outputs: vec![output],
            feed,
        }
    }
}

impl Source for MockedSource {
    fn name(&self) -> &str {
        "Mocked"
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.outputs
    }

    fn refresh(&self) -> anyhow::Result<bool> {
        self.feed.refresh()
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.feed.initialize()
    }

    fn clean_up(&self) {
        self.feed.clean_up()
    }
}
