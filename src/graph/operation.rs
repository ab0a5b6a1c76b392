//! Operations for the computation graph.
//!
//! Uses a simple enum instead of trait objects for clarity.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::layers::{Activation, ConvVariant, DenseConfig};

use super::buffer::DataBuffer;
use super::shape::{SamePadding, Shape};

/// Unique identifier for an operation.
pub type OpId = usize;

/// Global counter for unique operation IDs.
static OP_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Generates a new unique operation ID.
pub(crate) fn next_op_id() -> OpId {
    OP_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Default batch normalization epsilon.
pub const DEFAULT_BATCH_NORM_EPSILON: f32 = 1e-3;

/// What an operation computes, independent of its identity.
///
/// Spatial operations always use "same" padding; convolutions carry no bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpKind {
    Conv2d {
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        variant: ConvVariant,
    },
    BatchNorm {
        epsilon: f32,
    },
    Activation {
        activation: Activation,
    },
    MaxPool2d {
        pool_size: [usize; 2],
        strides: [usize; 2],
    },
    Add,
    GlobalAvgPool2d,
    Dense {
        units: usize,
    },
}

impl OpKind {
    /// Keras-style layer type name, also used to derive layer names.
    pub fn layer_type(&self) -> &'static str {
        match self {
            Self::Conv2d { variant, .. } => variant.layer_name(),
            Self::BatchNorm { .. } => "batch_normalization",
            Self::Activation { .. } => "activation",
            Self::MaxPool2d { .. } => "max_pooling2d",
            Self::Add => "add",
            Self::GlobalAvgPool2d => "global_average_pooling2d",
            Self::Dense { .. } => "dense",
        }
    }

    /// Validates the parameters carried by this kind.
    fn validate(&self) -> Result<(), ModelError> {
        let operation = self.layer_type();
        match self {
            Self::Conv2d {
                filters,
                kernel_size,
                strides,
                ..
            } => {
                if *filters == 0 {
                    return Err(ModelError::invalid_config(operation, "filters must be at least 1"));
                }
                check_window(operation, "kernel_size", kernel_size)?;
                check_window(operation, "strides", strides)
            }
            Self::MaxPool2d { pool_size, strides } => {
                check_window(operation, "pool_size", pool_size)?;
                check_window(operation, "strides", strides)
            }
            Self::BatchNorm { epsilon } => {
                if !(epsilon.is_finite() && *epsilon > 0.0) {
                    return Err(ModelError::invalid_config(
                        operation,
                        format!("epsilon must be positive and finite, got {epsilon}"),
                    ));
                }
                Ok(())
            }
            Self::Dense { units } => {
                if *units == 0 {
                    return Err(ModelError::invalid_config(operation, "units must be at least 1"));
                }
                Ok(())
            }
            Self::Activation { .. } | Self::Add | Self::GlobalAvgPool2d => Ok(()),
        }
    }

    /// Infers the output shape for the given input shapes.
    pub fn output_shape(&self, inputs: &[Shape]) -> Result<Shape, ModelError> {
        let operation = self.layer_type();
        let Some(first) = inputs.first() else {
            return Err(ModelError::invalid_config(operation, "requires at least one input"));
        };

        match self {
            Self::Conv2d {
                filters,
                kernel_size,
                strides,
                ..
            } => {
                let (height, width, _) = first.expect_spatial(operation)?;
                let rows = SamePadding::new(height, kernel_size[0], strides[0]);
                let cols = SamePadding::new(width, kernel_size[1], strides[1]);
                Ok(Shape::spatial(rows.output, cols.output, *filters))
            }
            Self::MaxPool2d { pool_size, strides } => {
                let (height, width, channels) = first.expect_spatial(operation)?;
                let rows = SamePadding::new(height, pool_size[0], strides[0]);
                let cols = SamePadding::new(width, pool_size[1], strides[1]);
                Ok(Shape::spatial(rows.output, cols.output, channels))
            }
            Self::BatchNorm { .. } | Self::Activation { .. } => Ok(*first),
            Self::Add => {
                if inputs.len() < 2 {
                    return Err(ModelError::invalid_config(operation, "requires at least 2 inputs"));
                }
                for shape in &inputs[1..] {
                    if shape != first {
                        return Err(ModelError::ShapeMismatch {
                            operation,
                            expected: *first,
                            actual: *shape,
                        });
                    }
                }
                Ok(*first)
            }
            Self::GlobalAvgPool2d => {
                let (_, _, channels) = first.expect_spatial(operation)?;
                Ok(Shape::flat(channels))
            }
            Self::Dense { units } => {
                first.expect_flat(operation)?;
                Ok(Shape::flat(*units))
            }
        }
    }

    /// Number of parameters this kind holds for the given primary input shape.
    ///
    /// Returns `(trainable, non_trainable)`; batch-norm running statistics are non-trainable.
    pub fn param_count(&self, input: &Shape) -> (usize, usize) {
        match self {
            Self::Conv2d {
                filters,
                kernel_size,
                variant,
                ..
            } => (variant.param_count(input.channels(), *filters, *kernel_size), 0),
            Self::BatchNorm { .. } => (2 * input.channels(), 2 * input.channels()),
            Self::Dense { units } => (DenseConfig::new(input.channels(), *units).param_count(), 0),
            Self::Activation { .. } | Self::MaxPool2d { .. } | Self::Add | Self::GlobalAvgPool2d => {
                (0, 0)
            }
        }
    }
}

fn check_window(operation: &'static str, name: &str, window: &[usize; 2]) -> Result<(), ModelError> {
    if window.iter().any(|&dim| dim == 0) {
        return Err(ModelError::invalid_config(
            operation,
            format!("{name} must be a pair of positive integers, got {window:?}"),
        ));
    }
    Ok(())
}

/// A computation operation in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    id: OpId,
    kind: OpKind,
}

impl Operation {
    /// Creates a new operation after validating its parameters.
    pub fn new(kind: OpKind) -> Result<Self, ModelError> {
        kind.validate()?;
        Ok(Self {
            id: next_op_id(),
            kind,
        })
    }

    /// Returns the unique ID of this operation.
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    /// Applies this operation to an input buffer, returning a new DataBuffer.
    pub fn apply(&self, input: DataBuffer) -> Result<DataBuffer, ModelError> {
        self.apply_multi(vec![input])
    }

    /// Applies this operation to multiple input buffers.
    pub fn apply_multi(&self, inputs: Vec<DataBuffer>) -> Result<DataBuffer, ModelError> {
        let input_shapes: Vec<Shape> = inputs.iter().map(|b| b.shape()).collect();
        let shape = self.kind.output_shape(&input_shapes)?;
        Ok(DataBuffer::new(shape, Some(self.clone()), inputs))
    }
}

/// Convenience functions for creating operations and applying them in one step.
pub mod ops {
    use super::*;

    /// Applies a standard bias-free convolution with "same" padding.
    ///
    /// # Example
    /// ```
    /// use xception::graph::{InputBuffer, Shape, ops};
    ///
    /// let input = InputBuffer::new(Shape::spatial(299, 299, 3));
    /// let output = ops::conv2d(32, [3, 3], [2, 2], input.buffer()).unwrap();
    /// assert_eq!(output.shape(), Shape::spatial(150, 150, 32));
    /// ```
    pub fn conv2d(
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        input: DataBuffer,
    ) -> Result<DataBuffer, ModelError> {
        conv(ConvVariant::Standard, filters, kernel_size, strides, input)
    }

    /// Applies a depthwise-separable bias-free convolution with "same" padding.
    pub fn separable_conv2d(
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        input: DataBuffer,
    ) -> Result<DataBuffer, ModelError> {
        conv(ConvVariant::Separable, filters, kernel_size, strides, input)
    }

    /// Applies a convolution of the given variant.
    pub fn conv(
        variant: ConvVariant,
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        input: DataBuffer,
    ) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::Conv2d {
            filters,
            kernel_size,
            strides,
            variant,
        })?
        .apply(input)
    }

    /// Applies batch normalization over the last axis with the default epsilon.
    pub fn batch_norm(input: DataBuffer) -> Result<DataBuffer, ModelError> {
        batch_norm_with_epsilon(DEFAULT_BATCH_NORM_EPSILON, input)
    }

    /// Applies batch normalization with custom epsilon.
    pub fn batch_norm_with_epsilon(epsilon: f32, input: DataBuffer) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::BatchNorm { epsilon })?.apply(input)
    }

    /// Applies an activation function.
    pub fn activation(activation: Activation, input: DataBuffer) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::Activation { activation })?.apply(input)
    }

    pub fn relu(input: DataBuffer) -> Result<DataBuffer, ModelError> {
        activation(Activation::Relu, input)
    }

    /// Applies softmax across the last axis.
    pub fn softmax(input: DataBuffer) -> Result<DataBuffer, ModelError> {
        activation(Activation::Softmax, input)
    }

    /// Applies max pooling with "same" padding.
    pub fn max_pool2d(
        pool_size: [usize; 2],
        strides: [usize; 2],
        input: DataBuffer,
    ) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::MaxPool2d { pool_size, strides })?.apply(input)
    }

    /// Adds buffers element-wise. All inputs must have the same shape.
    ///
    /// # Example
    /// ```
    /// use xception::graph::{InputBuffer, Shape, ops};
    ///
    /// let input = InputBuffer::new(Shape::spatial(8, 8, 16));
    /// let x = ops::relu(input.buffer()).unwrap();
    /// let sum = ops::add(vec![input.buffer(), x]).unwrap();
    /// assert_eq!(sum.shape(), Shape::spatial(8, 8, 16));
    /// ```
    pub fn add(inputs: Vec<DataBuffer>) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::Add)?.apply_multi(inputs)
    }

    /// Averages over the spatial axes, producing a flat feature vector.
    pub fn global_avg_pool2d(input: DataBuffer) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::GlobalAvgPool2d)?.apply(input)
    }

    /// Applies a fully connected layer with bias.
    pub fn dense(units: usize, input: DataBuffer) -> Result<DataBuffer, ModelError> {
        Operation::new(OpKind::Dense { units })?.apply(input)
    }
}
