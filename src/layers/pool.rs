//! Pooling layers.

use burn::{
    nn::{
        PaddingConfig2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, backend::Backend},
};

use super::pad_same;

/// Max pooling with "same" padding. Padded cells never win the max.
#[derive(Debug, Clone)]
pub struct MaxPoolLayer {
    pool: MaxPool2d,
    pool_size: [usize; 2],
    strides: [usize; 2],
}

impl MaxPoolLayer {
    pub fn new(pool_size: [usize; 2], strides: [usize; 2]) -> Self {
        let pool = MaxPool2dConfig::new(pool_size)
            .with_strides(strides)
            .with_padding(PaddingConfig2d::Valid)
            .init();
        Self {
            pool,
            pool_size,
            strides,
        }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let padded = pad_same(input, self.pool_size, self.strides, f32::NEG_INFINITY);
        self.pool.forward(padded)
    }
}

/// Averages every channel over both spatial axes.
#[derive(Debug, Clone)]
pub struct GlobalAvgPoolLayer {
    pool: AdaptiveAvgPool2d,
}

impl GlobalAvgPoolLayer {
    pub fn new() -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// Maps `[batch, channels, height, width]` to `[batch, channels]`.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = input.dims();
        self.pool.forward(input).reshape([batch, channels])
    }
}

impl Default for GlobalAvgPoolLayer {
    fn default() -> Self {
        Self::new()
    }
}
