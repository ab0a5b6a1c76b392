//! Dense (fully connected) layer implementation.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{Tensor, backend::Backend},
};

/// Configuration for a Dense layer.
#[derive(Debug, Clone)]
pub struct DenseConfig {
    /// Number of input features.
    pub input_size: usize,
    /// Number of output features.
    pub output_size: usize,
}

impl DenseConfig {
    /// Creates a new DenseConfig.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            output_size,
        }
    }

    /// Weights plus bias.
    pub fn param_count(&self) -> usize {
        self.input_size * self.output_size + self.output_size
    }

    /// Initializes the Dense layer with the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Dense<B> {
        let linear = LinearConfig::new(self.input_size, self.output_size).init(device);

        Dense {
            linear,
            input_size: self.input_size,
            output_size: self.output_size,
        }
    }
}

/// A dense (fully connected) layer with bias: output = input @ weights + bias
///
/// Activations are separate graph operations.
#[derive(Module, Debug)]
pub struct Dense<B: Backend> {
    /// The underlying linear transformation.
    linear: Linear<B>,
    /// Input size (constant metadata).
    input_size: usize,
    /// Output size (constant metadata).
    output_size: usize,
}

impl<B: Backend> Dense<B> {
    /// Performs the forward pass.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(input)
    }

    /// Returns the input size of this layer.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Returns the output size of this layer.
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_dense_config_creation() {
        let config = DenseConfig::new(2048, 1000);

        assert_eq!(config.input_size, 2048);
        assert_eq!(config.output_size, 1000);
        assert_eq!(config.param_count(), 2_049_000);
    }

    #[test]
    fn test_dense_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let dense: Dense<TestBackend> = DenseConfig::new(4, 2).init(&device);

        let input = Tensor::<TestBackend, 2>::zeros([3, 4], &device);
        let output = dense.forward(input);

        assert_eq!(dense.input_size(), 4);
        assert_eq!(dense.output_size(), 2);
        assert_eq!(output.dims(), [3, 2]);
    }
}
