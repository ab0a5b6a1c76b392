//! Neural network layer implementations.
//!
//! This module contains the Burn-backed building blocks a compiled graph is
//! made of: convolutions, batch normalization, pooling, dense layers and
//! activation functions.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod norm;
pub mod pool;

pub use activation::Activation;
pub use conv::{ConvLayer, ConvLayerConfig, ConvVariant};
pub use dense::{Dense, DenseConfig};
pub use norm::BatchNormLayer;
pub use pool::{GlobalAvgPoolLayer, MaxPoolLayer};

use burn::tensor::{Tensor, backend::Backend};

use crate::graph::SamePadding;

/// Pads a `[batch, channels, height, width]` tensor so that a valid window op
/// with the given kernel and strides produces `ceil(size / stride)` outputs.
pub(crate) fn pad_same<B: Backend>(
    input: Tensor<B, 4>,
    kernel_size: [usize; 2],
    strides: [usize; 2],
    value: f32,
) -> Tensor<B, 4> {
    let [_, _, height, width] = input.dims();
    let rows = SamePadding::new(height, kernel_size[0], strides[0]);
    let cols = SamePadding::new(width, kernel_size[1], strides[1]);
    if rows.is_zero() && cols.is_zero() {
        return input;
    }
    input.pad((cols.before, cols.after, rows.before, rows.after), value)
}
