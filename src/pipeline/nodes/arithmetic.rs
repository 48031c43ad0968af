//! Binary arithmetic over `f64`: Add, Subtract, Multiply, Divide.
//!
//! Each operation reads inputs `a` and `b` and writes `result`. Both inputs
//! default to `0.0`, so a fresh step can run without any connections.

use crate::error::Result;
use crate::pipeline::bus::EventBus;
use crate::pipeline::hint::SocketHint;
use crate::pipeline::operation::{Category, Operation, OperationDescription, OperationMetaData};
use crate::pipeline::socket::Socket;
use anyhow::anyhow;
use std::sync::Arc;

type Apply = fn(f64, f64) -> anyhow::Result<f64>;

/// Two `f64` inputs, one `f64` output.
pub struct BinaryOperation {
    inputs: Vec<Arc<Socket>>,
    outputs: Vec<Arc<Socket>>,
    apply: Apply,
}

impl BinaryOperation {
    fn new(bus: &EventBus, apply: Apply) -> Result<Self> {
        let number = |id: &str| SocketHint::builder::<f64>(id).initial_value(0.0).build();
        Ok(Self {
            inputs: vec![Socket::input(number("a")?, bus), Socket::input(number("b")?, bus)],
            outputs: vec![Socket::output(number("result")?, bus)?],
            apply,
        })
    }

    fn operand(&self, index: usize) -> anyhow::Result<f64> {
        let socket = &self.inputs[index];
        socket
            .get::<f64>()
            .ok_or_else(|| anyhow!("input '{}' has no number", socket.identifier()))
    }
}

impl Operation for BinaryOperation {
    fn input_sockets(&self) -> &[Arc<Socket>] {
        &self.inputs
    }

    fn output_sockets(&self) -> &[Arc<Socket>] {
        &self.outputs
    }

    fn perform(&self) -> anyhow::Result<()> {
        let value = (self.apply)(self.operand(0)?, self.operand(1)?)?;
        self.outputs[0].set(value)?;
        Ok(())
    }
}

fn binary(name: &str, summary: &str, apply: Apply) -> OperationMetaData {
    let description = OperationDescription::builder(name)
        .summary(summary)
        .category(Category::Miscellaneous)
        .build();
    OperationMetaData::new(description, move |bus| {
        Ok(Box::new(BinaryOperation::new(bus, apply)?) as Box<dyn Operation>)
    })
}

pub fn add() -> OperationMetaData {
    binary("Add", "Compute the sum of two numbers", |a, b| Ok(a + b))
}

pub fn subtract() -> OperationMetaData {
    binary("Subtract", "Subtract b from a", |a, b| Ok(a - b))
}

pub fn multiply() -> OperationMetaData {
    binary("Multiply", "Compute the product of two numbers", |a, b| Ok(a * b))
}

pub fn divide() -> OperationMetaData {
    binary("Divide", "Divide a by b", |a, b| {
        if b == 0.0 {
            return Err(anyhow!("division by zero"));
        }
        Ok(a / b)
    })
}
