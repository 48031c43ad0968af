//! Test data builders for creating test operations

use anyhow::bail;
use pipeflow::error::Result;
use pipeflow::pipeline::{
    EventBus, Operation, OperationDescription, OperationMetaData, Socket, SocketHint,
};
use std::sync::{Arc, Mutex};

/// Names of the operations that performed, in order
pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Copy,
    Fail,
    Panic,
}

/// `in` (f64) copied to `out` (f64), optionally logging or failing
pub struct PassThrough {
    name: String,
    inputs: Vec<Arc<Socket>>,
    outputs: Vec<Arc<Socket>>,
    log: Option<RunLog>,
    behavior: Behavior,
}

impl Operation for PassThrough {
    fn input_sockets(&self) -> &[Arc<Socket>] {
        &self.inputs
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.outputs
    }

    fn perform(&self) -> anyhow::Result<()> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        match self.behavior {
            Behavior::Copy => {}
            Behavior::Fail => bail!("{} refused to perform", self.name),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
        let value = self.inputs[0].get::<f64>().unwrap_or_default();
        self.outputs[0].set(value)?;
        Ok(())
    }
}

/// Builder for [`PassThrough`] metadata
pub struct PassThroughBuilder {
    name: String,
    log: Option<RunLog>,
    behavior: Behavior,
    initial_input: Option<f64>,
}

impl PassThroughBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: None,
            behavior: Behavior::Copy,
            initial_input: Some(0.0),
        }
    }

    pub fn log(mut self, log: &RunLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Leave the input without a value until something sets it
    pub fn without_initial_input(mut self) -> Self {
        self.initial_input = None;
        self
    }

    pub fn build(self) -> OperationMetaData {
        let description = OperationDescription::builder(self.name.clone())
            .summary("Copies its input to its output")
            .build();
        OperationMetaData::new(description, move |bus: &EventBus| -> Result<Box<dyn Operation>> {
            let mut input = SocketHint::builder::<f64>("in");
            if let Some(initial) = self.initial_input {
                input = input.initial_value(initial);
            }
            let output = SocketHint::builder::<f64>("out").initial_value(0.0);
            Ok(Box::new(PassThrough {
                name: self.name.clone(),
                inputs: vec![Socket::input(input.build()?, bus)],
                outputs: vec![Socket::output(output.build()?, bus)?],
                log: self.log.clone(),
                behavior: self.behavior,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow::pipeline::StepFactory;

    #[test]
    fn test_pass_through_builder() {
        let bus = EventBus::new();
        let log = run_log();
        let meta = PassThroughBuilder::new("Copy").log(&log).build();
        let step = StepFactory::new(&bus).create(&meta).unwrap();

        step.input("in").unwrap().set(2.5f64).unwrap();
        step.run_perform(false);

        assert_eq!(step.output("out").unwrap().get::<f64>(), Some(2.5));
        assert_eq!(*log.lock().unwrap(), vec!["Copy".to_string()]);
    }
}
