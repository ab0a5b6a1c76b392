//! Convolutional units: the leaf pattern every Xception stage is built from.

use crate::errors::ModelError;
use crate::graph::{DataBuffer, ops};
use crate::layers::ConvVariant;

/// A convolution followed by batch normalization, with optional relu
/// activations before the convolution and after the normalization.
///
/// Padding is "same" and the convolution has no bias. Batch normalization is
/// always applied.
///
/// # Example
/// ```
/// use xception::graph::{InputBuffer, Shape};
/// use xception::xception::ConvUnit;
///
/// let input = InputBuffer::new(Shape::spatial(299, 299, 3));
/// let x = ConvUnit::new(32, [3, 3]).with_strides([2, 2]).apply(&input.buffer()).unwrap();
/// assert_eq!(x.shape(), Shape::spatial(150, 150, 32));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvUnit {
    pub filters: usize,
    pub kernel_size: [usize; 2],
    pub strides: [usize; 2],
    pub pre_activation: bool,
    pub post_activation: bool,
    pub variant: ConvVariant,
}

impl ConvUnit {
    /// A standard convolution unit: stride 1, post-activation only.
    pub fn new(filters: usize, kernel_size: [usize; 2]) -> Self {
        Self {
            filters,
            kernel_size,
            strides: [1, 1],
            pre_activation: false,
            post_activation: true,
            variant: ConvVariant::Standard,
        }
    }

    /// A 3x3 separable unit: pre-activation only, the inverse of [`ConvUnit::new`].
    pub fn separable(filters: usize) -> Self {
        Self {
            filters,
            kernel_size: [3, 3],
            strides: [1, 1],
            pre_activation: true,
            post_activation: false,
            variant: ConvVariant::Separable,
        }
    }

    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_pre_activation(mut self, pre_activation: bool) -> Self {
        self.pre_activation = pre_activation;
        self
    }

    pub fn with_post_activation(mut self, post_activation: bool) -> Self {
        self.post_activation = post_activation;
        self
    }

    pub fn with_variant(mut self, variant: ConvVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Appends the unit's operations after `input` and returns its output.
    pub fn apply(&self, input: &DataBuffer) -> Result<DataBuffer, ModelError> {
        let mut x = input.clone();
        if self.pre_activation {
            x = ops::relu(x)?;
        }
        x = ops::conv(self.variant, self.filters, self.kernel_size, self.strides, x)?;
        x = ops::batch_norm(x)?;
        if self.post_activation {
            x = ops::relu(x)?;
        }
        Ok(x)
    }
}

/// Applies a standard [`ConvUnit`] with default activation placement.
pub fn conv_unit(
    input: &DataBuffer,
    filters: usize,
    kernel_size: [usize; 2],
    strides: [usize; 2],
) -> Result<DataBuffer, ModelError> {
    ConvUnit::new(filters, kernel_size).with_strides(strides).apply(input)
}

/// Applies a [`ConvUnit::separable`] unit with default activation placement.
pub fn sep_conv_unit(input: &DataBuffer, filters: usize) -> Result<DataBuffer, ModelError> {
    ConvUnit::separable(filters).apply(input)
}
