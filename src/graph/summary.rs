//! Structural description of a graph: layer list, parameter counts,
//! a Keras-style text summary and a JSON export.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use super::buffer::{BufferId, DataBuffer};
use super::core::ModelGraph;
use super::operation::OpKind;
use super::shape::Shape;
use crate::errors::ModelError;

const INPUT_LAYER_NAME: &str = "input_layer";
const SUMMARY_WIDTH: usize = 110;

/// Declarative description of one node of a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    /// Unique layer name within the graph, e.g. `conv2d_3`.
    pub name: String,
    /// The operation; `None` for the input placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<OpKind>,
    pub output_shape: Shape,
    /// Names of the layers feeding this one.
    pub inputs: Vec<String>,
    pub params: ParamCount,
}

impl LayerSpec {
    /// Keras class name of the layer, e.g. `SeparableConv2D`.
    pub fn class_name(&self) -> &'static str {
        match &self.op {
            None => "InputLayer",
            Some(OpKind::Conv2d { variant, .. }) => match variant {
                crate::layers::ConvVariant::Standard => "Conv2D",
                crate::layers::ConvVariant::Separable => "SeparableConv2D",
            },
            Some(OpKind::BatchNorm { .. }) => "BatchNormalization",
            Some(OpKind::Activation { .. }) => "Activation",
            Some(OpKind::MaxPool2d { .. }) => "MaxPooling2D",
            Some(OpKind::Add) => "Add",
            Some(OpKind::GlobalAvgPool2d) => "GlobalAveragePooling2D",
            Some(OpKind::Dense { .. }) => "Dense",
        }
    }
}

/// Parameter totals, split like Keras reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParamCount {
    pub trainable: usize,
    pub non_trainable: usize,
}

impl ParamCount {
    pub fn total(&self) -> usize {
        self.trainable + self.non_trainable
    }
}

impl std::ops::Add for ParamCount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            trainable: self.trainable + rhs.trainable,
            non_trainable: self.non_trainable + rhs.non_trainable,
        }
    }
}

impl std::iter::Sum for ParamCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, p| acc + p)
    }
}

#[derive(Serialize)]
struct GraphExport<'a> {
    name: &'a str,
    input_shape: Shape,
    output_shape: Shape,
    layers: Vec<LayerSpec>,
    params: ParamCount,
}

impl ModelGraph {
    /// Describes every node in execution order, the input placeholder first.
    pub fn layers(&self) -> Vec<LayerSpec> {
        let mut names: HashMap<BufferId, String> = HashMap::new();
        let mut type_counts: HashMap<&'static str, usize> = HashMap::new();

        self.nodes()
            .iter()
            .map(|buffer| {
                let name = match buffer.producer() {
                    None => INPUT_LAYER_NAME.to_string(),
                    Some(op) => {
                        let layer_type = op.kind().layer_type();
                        let count = type_counts.entry(layer_type).or_insert(0);
                        let name = match *count {
                            0 => layer_type.to_string(),
                            n => format!("{layer_type}_{n}"),
                        };
                        *count += 1;
                        name
                    }
                };
                names.insert(buffer.id(), name.clone());

                LayerSpec {
                    name,
                    op: buffer.producer().map(|op| op.kind().clone()),
                    output_shape: buffer.shape(),
                    inputs: buffer
                        .inputs()
                        .iter()
                        .map(|input| names[&input.id()].clone())
                        .collect(),
                    params: buffer_params(buffer),
                }
            })
            .collect()
    }

    /// Total parameters across all layers.
    pub fn num_params(&self) -> ParamCount {
        self.nodes().iter().map(buffer_params).sum()
    }

    /// Renders a human-readable table of layers, shapes and parameters.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let rule = |c: char| c.to_string().repeat(SUMMARY_WIDTH);

        // Writing into a String cannot fail.
        let _ = writeln!(out, "Model: \"{}\"", self.name());
        let _ = writeln!(out, "{}", rule('_'));
        let _ = writeln!(
            out,
            " {:<44}{:<25}{:<12}{}",
            "Layer (type)", "Output Shape", "Param #", "Connected to"
        );
        let _ = writeln!(out, "{}", rule('='));
        for layer in self.layers() {
            let label = format!("{} ({})", layer.name, layer.class_name());
            let inputs: Vec<String> = layer.inputs.iter().map(|n| format!("'{n}'")).collect();
            let _ = writeln!(
                out,
                " {:<44}{:<25}{:<12}[{}]",
                label,
                layer.output_shape.to_string(),
                layer.params.total(),
                inputs.join(", ")
            );
        }
        let params = self.num_params();
        let _ = writeln!(out, "{}", rule('='));
        let _ = writeln!(out, "Total params: {}", thousands(params.total()));
        let _ = writeln!(out, "Trainable params: {}", thousands(params.trainable));
        let _ = writeln!(out, "Non-trainable params: {}", thousands(params.non_trainable));
        let _ = writeln!(out, "{}", rule('_'));
        out
    }

    /// Serializes the structure (no weights) as pretty JSON.
    pub fn to_json(&self) -> Result<String, ModelError> {
        let export = GraphExport {
            name: self.name(),
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
            layers: self.layers(),
            params: self.num_params(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

fn buffer_params(buffer: &DataBuffer) -> ParamCount {
    match (buffer.producer(), buffer.inputs().first()) {
        (Some(op), Some(input)) => {
            let (trainable, non_trainable) = op.kind().param_count(&input.shape());
            ParamCount {
                trainable,
                non_trainable,
            }
        }
        _ => ParamCount::default(),
    }
}

fn thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
