//! Activation functions for neural network layers.

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

/// Supported activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified Linear Unit: f(x) = max(0, x)
    Relu,
    /// Softmax normalization across the channel/class axis
    Softmax,
}

impl Activation {
    /// Applies the activation function to a tensor.
    ///
    /// `channel_dim` is the axis softmax normalizes over; relu ignores it.
    pub fn apply<B: Backend, const D: usize>(
        &self,
        tensor: Tensor<B, D>,
        channel_dim: usize,
    ) -> Tensor<B, D> {
        match self {
            Activation::Relu => burn::tensor::activation::relu(tensor),
            Activation::Softmax => burn::tensor::activation::softmax(tensor, channel_dim),
        }
    }

    /// Returns the lowercase name used in summaries and exports.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Softmax => "softmax",
        }
    }

    /// Creates an Activation from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "relu" => Some(Activation::Relu),
            "softmax" => Some(Activation::Softmax),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_activation_from_name() {
        assert_eq!(Activation::from_name("relu"), Some(Activation::Relu));
        assert_eq!(Activation::from_name("SOFTMAX"), Some(Activation::Softmax));
        assert_eq!(Activation::from_name("sigmoid"), None);
        assert_eq!(Activation::from_name(Activation::Relu.name()), Some(Activation::Relu));
    }

    #[test]
    fn test_relu_activation() {
        let device = <TestBackend as Backend>::Device::default();
        let input = Tensor::<TestBackend, 1>::from_floats([-2.0, -0.5, 0.0, 1.5], &device);
        let output = Activation::Relu.apply(input, 0);
        let result: Vec<f32> = output.to_data().to_vec().unwrap();
        assert_eq!(result, vec![0.0, 0.0, 0.0, 1.5]);
    }

    #[test]
    fn test_softmax_over_channel_axis() {
        let device = <TestBackend as Backend>::Device::default();
        // [batch=1, channels=3, height=1, width=2]
        let input = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, -1.0]], [[2.0, 0.0]], [[3.0, 1.0]]]],
            &device,
        );
        let output = Activation::Softmax.apply(input, 1);
        let sums: Vec<f32> = output.sum_dim(1).to_data().to_vec().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5, "softmax should sum to 1, got {}", sum);
        }
    }
}
