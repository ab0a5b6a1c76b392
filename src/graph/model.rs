//! CompiledModel - a graph with initialized Burn layers and a forward pass.

use std::collections::HashMap;

use burn::tensor::{Tensor, backend::Backend};

use crate::errors::ModelError;
use crate::layers::{
    Activation, BatchNormLayer, ConvLayer, ConvLayerConfig, Dense, DenseConfig, GlobalAvgPoolLayer,
    MaxPoolLayer,
};

use super::core::ModelGraph;
use super::operation::{OpId, OpKind};
use super::shape::Shape;
use super::summary::ParamCount;

/// Runtime value of a buffer: channels-first image batch or feature batch.
#[derive(Debug, Clone)]
enum Value<B: Backend> {
    Spatial(Tensor<B, 4>),
    Flat(Tensor<B, 2>),
}

impl<B: Backend> Value<B> {
    fn spatial(self, operation: &str) -> Result<Tensor<B, 4>, ModelError> {
        match self {
            Value::Spatial(tensor) => Ok(tensor),
            Value::Flat(_) => Err(ModelError::InvalidGraph(format!(
                "{operation} received a flat tensor where a spatial one was expected"
            ))),
        }
    }

    fn add(self, other: Self) -> Result<Self, ModelError> {
        match (self, other) {
            (Value::Spatial(a), Value::Spatial(b)) => Ok(Value::Spatial(a.add(b))),
            (Value::Flat(a), Value::Flat(b)) => Ok(Value::Flat(a.add(b))),
            _ => Err(ModelError::InvalidGraph(
                "add received tensors of different ranks".to_string(),
            )),
        }
    }
}

/// Execution step in the forward pass.
///
/// Buffer references are dense slot indices into the forward pass's value table.
#[derive(Debug, Clone)]
enum Step {
    Conv {
        op_id: OpId,
        input: usize,
        output: usize,
    },
    BatchNorm {
        op_id: OpId,
        input: usize,
        output: usize,
    },
    Activation {
        activation: Activation,
        input: usize,
        output: usize,
    },
    MaxPool {
        op_id: OpId,
        input: usize,
        output: usize,
    },
    Add {
        inputs: Vec<usize>,
        output: usize,
    },
    GlobalAvgPool {
        input: usize,
        output: usize,
    },
    Dense {
        op_id: OpId,
        input: usize,
        output: usize,
    },
}

impl Step {
    fn inputs(&self) -> &[usize] {
        match self {
            Step::Conv { input, .. }
            | Step::BatchNorm { input, .. }
            | Step::Activation { input, .. }
            | Step::MaxPool { input, .. }
            | Step::GlobalAvgPool { input, .. }
            | Step::Dense { input, .. } => std::slice::from_ref(input),
            Step::Add { inputs, .. } => inputs,
        }
    }
}

/// A graph whose operations own initialized weights on a device.
///
/// Inputs are channels-last `[batch, height, width, channels]` tensors, as
/// declared by the graph; execution runs channels-first internally.
#[derive(Debug)]
pub struct CompiledModel<B: Backend> {
    name: String,
    input_shape: Shape,
    output_shape: Shape,
    params: ParamCount,
    conv_layers: HashMap<OpId, ConvLayer<B>>,
    batch_norm_layers: HashMap<OpId, BatchNormLayer<B>>,
    pool_layers: HashMap<OpId, MaxPoolLayer>,
    dense_layers: HashMap<OpId, Dense<B>>,
    global_pool: GlobalAvgPoolLayer,
    steps: Vec<Step>,
    /// For each step, the slots whose last reader it is.
    releases: Vec<Vec<usize>>,
    num_slots: usize,
    output_slot: usize,
}

impl<B: Backend> CompiledModel<B> {
    /// Initializes one Burn layer per operation and fixes the execution order.
    pub fn new(graph: &ModelGraph, device: &B::Device) -> Result<Self, ModelError> {
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut conv_layers = HashMap::new();
        let mut batch_norm_layers = HashMap::new();
        let mut pool_layers = HashMap::new();
        let mut dense_layers = HashMap::new();
        let mut steps = Vec::new();

        for (slot, buffer) in graph.nodes().iter().enumerate() {
            slots.insert(buffer.id(), slot);
            let Some(op) = buffer.producer() else {
                continue;
            };

            let inputs: Vec<usize> = buffer.inputs().iter().map(|b| slots[&b.id()]).collect();
            let Some(&input) = inputs.first() else {
                return Err(ModelError::InvalidGraph(format!(
                    "Operation {} has no inputs",
                    op.id()
                )));
            };
            let input_shape = buffer.inputs()[0].shape();
            let op_id = op.id();

            let step = match op.kind() {
                OpKind::Conv2d {
                    filters,
                    kernel_size,
                    strides,
                    variant,
                } => {
                    conv_layers.entry(op_id).or_insert_with(|| {
                        ConvLayerConfig::new(*variant, input_shape.channels(), *filters, *kernel_size)
                            .with_strides(*strides)
                            .init(device)
                    });
                    Step::Conv {
                        op_id,
                        input,
                        output: slot,
                    }
                }
                OpKind::BatchNorm { epsilon } => {
                    batch_norm_layers.entry(op_id).or_insert_with(|| {
                        BatchNormLayer::new(input_shape.channels(), *epsilon, device)
                    });
                    Step::BatchNorm {
                        op_id,
                        input,
                        output: slot,
                    }
                }
                OpKind::Activation { activation } => Step::Activation {
                    activation: *activation,
                    input,
                    output: slot,
                },
                OpKind::MaxPool2d { pool_size, strides } => {
                    pool_layers
                        .entry(op_id)
                        .or_insert_with(|| MaxPoolLayer::new(*pool_size, *strides));
                    Step::MaxPool {
                        op_id,
                        input,
                        output: slot,
                    }
                }
                OpKind::Add => Step::Add {
                    inputs,
                    output: slot,
                },
                OpKind::GlobalAvgPool2d => Step::GlobalAvgPool {
                    input,
                    output: slot,
                },
                OpKind::Dense { units } => {
                    dense_layers.entry(op_id).or_insert_with(|| {
                        DenseConfig::new(input_shape.channels(), *units).init(device)
                    });
                    Step::Dense {
                        op_id,
                        input,
                        output: slot,
                    }
                }
            };
            steps.push(step);
        }

        let num_slots = graph.nodes().len();
        let output_slot = slots[&graph.output().id()];
        let releases = release_schedule(&steps, num_slots, output_slot);

        log::info!(
            "Compiled model \"{}\": {} steps, {} parameters",
            graph.name(),
            steps.len(),
            graph.num_params().total()
        );

        Ok(Self {
            name: graph.name().to_string(),
            input_shape: graph.input_shape(),
            output_shape: graph.output_shape(),
            params: graph.num_params(),
            conv_layers,
            batch_norm_layers,
            pool_layers,
            dense_layers,
            global_pool: GlobalAvgPoolLayer::new(),
            steps,
            releases,
            num_slots,
            output_slot,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    pub fn output_shape(&self) -> Shape {
        self.output_shape
    }

    pub fn num_params(&self) -> ParamCount {
        self.params
    }

    /// Performs a forward pass on a `[batch, height, width, channels]` input.
    ///
    /// Returns `[batch, features]` for graphs with a flat output.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>, ModelError> {
        match self.run(input)? {
            Value::Flat(tensor) => Ok(tensor),
            Value::Spatial(_) => Err(ModelError::InvalidGraph(
                "Model output is spatial; use forward_spatial".to_string(),
            )),
        }
    }

    /// Performs a forward pass for graphs with a spatial output.
    ///
    /// The result is channels-last, like the input.
    pub fn forward_spatial(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>, ModelError> {
        let output = self.run(input)?.spatial("forward_spatial")?;
        Ok(output.permute([0, 2, 3, 1]))
    }

    fn run(&self, input: Tensor<B, 4>) -> Result<Value<B>, ModelError> {
        let [batch, height, width, channels] = input.dims();
        let actual = Shape::spatial(height, width, channels);
        if actual != self.input_shape {
            return Err(ModelError::ShapeMismatch {
                operation: "forward",
                expected: self.input_shape,
                actual,
            });
        }
        log::debug!("Forward pass of \"{}\" with batch size {}", self.name, batch);

        let mut values: Vec<Option<Value<B>>> = vec![None; self.num_slots];
        values[0] = Some(Value::Spatial(input.permute([0, 3, 1, 2])));

        for (step, releases) in self.steps.iter().zip(&self.releases) {
            let (output, value) = self.execute(step, &values)?;
            values[output] = Some(value);
            for &slot in releases {
                values[slot] = None;
            }
        }

        values[self.output_slot].take().ok_or_else(|| {
            ModelError::InvalidGraph("Output buffer was never produced".to_string())
        })
    }

    fn execute(&self, step: &Step, values: &[Option<Value<B>>]) -> Result<(usize, Value<B>), ModelError> {
        let read = |slot: usize| -> Result<Value<B>, ModelError> {
            values[slot]
                .clone()
                .ok_or_else(|| ModelError::InvalidGraph(format!("Slot {slot} read before being written")))
        };

        let result = match step {
            Step::Conv {
                op_id,
                input,
                output,
            } => {
                let layer = self.layer(&self.conv_layers, op_id)?;
                let x = read(*input)?.spatial("conv2d")?;
                (*output, Value::Spatial(layer.forward(x)))
            }
            Step::BatchNorm {
                op_id,
                input,
                output,
            } => {
                let layer = self.layer(&self.batch_norm_layers, op_id)?;
                let value = match read(*input)? {
                    Value::Spatial(x) => Value::Spatial(layer.forward(x)),
                    Value::Flat(x) => Value::Flat(layer.forward_flat(x)),
                };
                (*output, value)
            }
            Step::Activation {
                activation,
                input,
                output,
            } => {
                let value = match read(*input)? {
                    Value::Spatial(x) => Value::Spatial(activation.apply(x, 1)),
                    Value::Flat(x) => Value::Flat(activation.apply(x, 1)),
                };
                (*output, value)
            }
            Step::MaxPool {
                op_id,
                input,
                output,
            } => {
                let layer = self.layer(&self.pool_layers, op_id)?;
                let x = read(*input)?.spatial("max_pool2d")?;
                (*output, Value::Spatial(layer.forward(x)))
            }
            Step::Add { inputs, output } => {
                let mut sum = read(inputs[0])?;
                for &slot in &inputs[1..] {
                    sum = sum.add(read(slot)?)?;
                }
                (*output, sum)
            }
            Step::GlobalAvgPool { input, output } => {
                let x = read(*input)?.spatial("global_average_pooling2d")?;
                (*output, Value::Flat(self.global_pool.forward(x)))
            }
            Step::Dense {
                op_id,
                input,
                output,
            } => {
                let layer = self.layer(&self.dense_layers, op_id)?;
                let x = match read(*input)? {
                    Value::Flat(x) => x,
                    Value::Spatial(_) => {
                        return Err(ModelError::InvalidGraph(
                            "dense received a spatial tensor".to_string(),
                        ));
                    }
                };
                (*output, Value::Flat(layer.forward(x)))
            }
        };
        Ok(result)
    }

    fn layer<'a, L>(&self, layers: &'a HashMap<OpId, L>, op_id: &OpId) -> Result<&'a L, ModelError> {
        layers
            .get(op_id)
            .ok_or_else(|| ModelError::InvalidGraph(format!("No layer initialized for operation {op_id}")))
    }
}

/// Computes, for each step, which slots can be dropped after it runs.
fn release_schedule(steps: &[Step], num_slots: usize, output_slot: usize) -> Vec<Vec<usize>> {
    let mut last_reader: Vec<Option<usize>> = vec![None; num_slots];
    for (index, step) in steps.iter().enumerate() {
        for &slot in step.inputs() {
            last_reader[slot] = Some(index);
        }
    }

    let mut releases = vec![Vec::new(); steps.len()];
    for (slot, reader) in last_reader.into_iter().enumerate() {
        match reader {
            Some(index) if slot != output_slot => releases[index].push(slot),
            _ => {}
        }
    }
    releases
}
