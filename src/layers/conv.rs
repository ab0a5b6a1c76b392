//! Convolution layers: the variant choice and its Burn implementation.

use std::fmt;
use std::str::FromStr;

use burn::{
    module::Module,
    nn::{
        PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    tensor::{Tensor, backend::Backend},
};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

use super::pad_same;

/// Kind of spatial convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvVariant {
    /// Dense convolution across all input channels.
    #[default]
    Standard,
    /// Depthwise convolution followed by a pointwise (1x1) convolution.
    Separable,
}

impl ConvVariant {
    /// Layer type name used in summaries.
    pub fn layer_name(&self) -> &'static str {
        match self {
            ConvVariant::Standard => "conv2d",
            ConvVariant::Separable => "separable_conv2d",
        }
    }

    /// Parses a variant name, case-insensitively.
    ///
    /// Accepts `conv2d`/`standard` and `separable_conv2d`/`separableconv2d`/`separable`.
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        match name.to_lowercase().as_str() {
            "conv2d" | "standard" => Ok(ConvVariant::Standard),
            "separable_conv2d" | "separableconv2d" | "separable" => Ok(ConvVariant::Separable),
            _ => Err(ModelError::invalid_config(
                "conv_unit",
                format!("conv variant must be either conv2d or separable_conv2d, found {name:?}"),
            )),
        }
    }

    /// Number of weights for a bias-free convolution of this variant.
    pub fn param_count(&self, in_channels: usize, filters: usize, kernel_size: [usize; 2]) -> usize {
        let window = kernel_size[0] * kernel_size[1];
        match self {
            ConvVariant::Standard => window * in_channels * filters,
            ConvVariant::Separable => window * in_channels + in_channels * filters,
        }
    }
}

impl FromStr for ConvVariant {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for ConvVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layer_name())
    }
}

/// Configuration for a [`ConvLayer`].
#[derive(Debug, Clone)]
pub struct ConvLayerConfig {
    pub variant: ConvVariant,
    pub in_channels: usize,
    pub filters: usize,
    pub kernel_size: [usize; 2],
    pub strides: [usize; 2],
}

impl ConvLayerConfig {
    /// Creates a stride-1 configuration.
    pub fn new(variant: ConvVariant, in_channels: usize, filters: usize, kernel_size: [usize; 2]) -> Self {
        Self {
            variant,
            in_channels,
            filters,
            kernel_size,
            strides: [1, 1],
        }
    }

    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = strides;
        self
    }

    /// Initializes the layer with the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvLayer<B> {
        let (depthwise, pointwise) = match self.variant {
            ConvVariant::Standard => {
                let conv = Conv2dConfig::new([self.in_channels, self.filters], self.kernel_size)
                    .with_stride(self.strides)
                    .with_padding(PaddingConfig2d::Valid)
                    .with_bias(false)
                    .init(device);
                (None, conv)
            }
            ConvVariant::Separable => {
                let depthwise = Conv2dConfig::new([self.in_channels, self.in_channels], self.kernel_size)
                    .with_stride(self.strides)
                    .with_groups(self.in_channels)
                    .with_padding(PaddingConfig2d::Valid)
                    .with_bias(false)
                    .init(device);
                let pointwise = Conv2dConfig::new([self.in_channels, self.filters], [1, 1])
                    .with_bias(false)
                    .init(device);
                (Some(depthwise), pointwise)
            }
        };

        ConvLayer {
            depthwise,
            pointwise,
            kernel_size: self.kernel_size,
            strides: self.strides,
        }
    }
}

/// Bias-free convolution with "same" padding.
///
/// For the standard variant `pointwise` holds the full convolution.
#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    depthwise: Option<Conv2d<B>>,
    pointwise: Conv2d<B>,
    kernel_size: [usize; 2],
    strides: [usize; 2],
}

impl<B: Backend> ConvLayer<B> {
    /// Forward pass on a `[batch, channels, height, width]` tensor.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let padded = pad_same(input, self.kernel_size, self.strides, 0.0);
        match &self.depthwise {
            Some(depthwise) => self.pointwise.forward(depthwise.forward(padded)),
            None => self.pointwise.forward(padded),
        }
    }

    pub fn is_separable(&self) -> bool {
        self.depthwise.is_some()
    }
}
