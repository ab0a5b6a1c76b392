//! Batch normalization over the channel axis of image tensors.

use burn::{
    module::Module,
    nn::{BatchNorm, BatchNormConfig},
    tensor::{Tensor, backend::Backend},
};

/// Momentum used to update running statistics (Burn convention: weight of the new value).
pub const BATCH_NORM_MOMENTUM: f64 = 0.01;

/// Initialized BatchNorm layer with Burn's BatchNorm module.
///
/// Accepts `[batch, channels, height, width]` tensors, or `[batch, features]`
/// tensors which are normalized per feature.
#[derive(Module, Debug)]
pub struct BatchNormLayer<B: Backend> {
    batch_norm: BatchNorm<B, 2>,
    num_features: usize,
    epsilon: f32,
}

impl<B: Backend> BatchNormLayer<B> {
    pub fn new(num_features: usize, epsilon: f32, device: &B::Device) -> Self {
        let batch_norm = BatchNormConfig::new(num_features)
            .with_epsilon(epsilon as f64)
            .with_momentum(BATCH_NORM_MOMENTUM)
            .init(device);
        Self {
            batch_norm,
            num_features,
            epsilon,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.batch_norm.forward(input)
    }

    pub fn forward_flat(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, features] = input.dims();
        let input_4d = input.reshape([batch, features, 1, 1]);
        self.forward(input_4d).reshape([batch, features])
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}
