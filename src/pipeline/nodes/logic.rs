//! Logical routing: Switch and Valve.

use crate::error::Result;
use crate::pipeline::bus::EventBus;
use crate::pipeline::hint::{SocketHint, View};
use crate::pipeline::operation::{Category, Operation, OperationDescription, OperationMetaData};
use crate::pipeline::socket::Socket;
use std::sync::Arc;

fn flag(id: &str) -> Result<SocketHint> {
    SocketHint::builder::<bool>(id)
        .initial_value(true)
        .view(View::Checkbox)
        .build()
}

fn number(id: &str) -> Result<SocketHint> {
    SocketHint::builder::<f64>(id).initial_value(0.0).build()
}

/// Routes `if_true` or `if_false` to `result` depending on `switch`.
pub struct SwitchOperation {
    inputs: Vec<Arc<Socket>>,
    outputs: Vec<Arc<Socket>>,
}

impl SwitchOperation {
    pub fn new(bus: &EventBus) -> Result<Self> {
        Ok(Self {
            inputs: vec![
                Socket::input(flag("switch")?, bus),
                Socket::input(number("if_true")?, bus),
                Socket::input(number("if_false")?, bus),
            ],
            outputs: vec![Socket::output(number("result")?, bus)?],
        })
    }
}

impl Operation for SwitchOperation {
    fn input_sockets(&self) -> &[Arc<Socket>] {
        &self.inputs
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.outputs
    }

    fn perform(&self) -> anyhow::Result<()> {
        let chosen = if self.inputs[0].get::<bool>().unwrap_or(false) {
            &self.inputs[1]
        } else {
            &self.inputs[2]
        };
        self.outputs[0].set_value_optional(chosen.value())?;
        Ok(())
    }
}

/// Passes `input` to `output` while `open`; a closed valve resets `output`.
pub struct ValveOperation {
    inputs: Vec<Arc<Socket>>,
    outputs: Vec<Arc<Socket>>,
}

impl ValveOperation {
    pub fn new(bus: &EventBus) -> Result<Self> {
        Ok(Self {
            inputs: vec![
                Socket::input(flag("open")?, bus),
                Socket::input(number("input")?, bus),
            ],
            outputs: vec![Socket::output(number("output")?, bus)?],
        })
    }
}

impl Operation for ValveOperation {
    fn input_sockets(&self) -> &[Arc<Socket>] {
        &self.inputs
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.outputs
    }

    fn perform(&self) -> anyhow::Result<()> {
        if self.inputs[0].get::<bool>().unwrap_or(false) {
            self.outputs[0].set_value_optional(self.inputs[1].value())?;
        } else {
            self.outputs[0].reset_value_to_initial();
        }
        Ok(())
    }
}

pub fn switch() -> OperationMetaData {
    let description = OperationDescription::builder("Switch")
        .summary("Switch between two possible inputs using a boolean")
        .category(Category::Logical)
        .build();
    OperationMetaData::new(description, |bus| {
        Ok(Box::new(SwitchOperation::new(bus)?) as Box<dyn Operation>)
    })
}

pub fn valve() -> OperationMetaData {
    let description = OperationDescription::builder("Valve")
        .summary("Toggle an output socket on or off using a boolean")
        .category(Category::Logical)
        .build();
    OperationMetaData::new(description, |bus| {
        Ok(Box::new(ValveOperation::new(bus)?) as Box<dyn Operation>)
    })
}
