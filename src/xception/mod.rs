//! The Xception architecture.
//!
//! Paper: <https://arxiv.org/abs/1610.02357>
//!
//! The network is three macro-stages wired in sequence:
//! - [`entry_flow`]: stem convolutions and three downsampling residual blocks
//!   (128, 256, 728 filters),
//! - [`middle_flow`]: eight 728-channel residual blocks at constant resolution,
//! - [`exit_flow`]: a final downsampling block, two expansion units
//!   (1536, 2048), global pooling and a 1000-class softmax head.

mod flows;
mod units;

pub use flows::{
    CLASSIFIER_HIDDEN_UNITS, ENTRY_FLOW_FILTERS, EXIT_FLOW_EXPANSION, EXIT_FLOW_FILTERS,
    MIDDLE_FLOW_CHANNELS, MIDDLE_FLOW_DEPTH, MIDDLE_FLOW_REPEATS, NUM_CLASSES, STEM_FILTERS,
    entry_flow, exit_flow, middle_flow, residual_block,
};
pub use units::{ConvUnit, conv_unit, sep_conv_unit};

use crate::errors::ModelError;
use crate::graph::{InputBuffer, ModelGraph, Shape};

/// Name given to the assembled graph.
pub const MODEL_NAME: &str = "Xception";

/// Default input image shape: `[height, width, channels]`.
pub const DEFAULT_INPUT_SHAPE: [usize; 3] = [299, 299, 3];

/// Configuration for assembling an Xception graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XceptionConfig {
    /// Input image shape `[height, width, channels]`; batch is implicit.
    pub input_shape: [usize; 3],
}

impl Default for XceptionConfig {
    fn default() -> Self {
        Self {
            input_shape: DEFAULT_INPUT_SHAPE,
        }
    }
}

impl XceptionConfig {
    /// Creates a new XceptionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the input image shape.
    pub fn with_input_shape(mut self, input_shape: [usize; 3]) -> Self {
        self.input_shape = input_shape;
        self
    }

    /// Declares the input placeholder and wires entry, middle and exit flows.
    ///
    /// # Example
    /// ```
    /// use xception::graph::Shape;
    /// use xception::xception::XceptionConfig;
    ///
    /// let graph = XceptionConfig::new().build().unwrap();
    /// assert_eq!(graph.name(), "Xception");
    /// assert_eq!(graph.output_shape(), Shape::flat(1000));
    /// ```
    pub fn build(&self) -> Result<ModelGraph, ModelError> {
        let [height, width, channels] = self.input_shape;
        if self.input_shape.contains(&0) {
            return Err(ModelError::invalid_config(
                "input_layer",
                format!("input shape must be positive, got {:?}", self.input_shape),
            ));
        }

        let input = InputBuffer::new(Shape::spatial(height, width, channels));
        let x = entry_flow(&input.buffer())?;
        let x = middle_flow(&x)?;
        let output = exit_flow(&x)?;

        let graph = ModelGraph::new(MODEL_NAME, input, output)?;
        log::info!(
            "Built {} for input {}: {} layers, {} parameters",
            graph.name(),
            graph.input_shape(),
            graph.nodes().len(),
            graph.num_params().total()
        );
        Ok(graph)
    }
}

/// Builds the Xception graph for 299x299 RGB images.
pub fn xception() -> Result<ModelGraph, ModelError> {
    XceptionConfig::default().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpKind;

    #[test]
    fn test_default_config() {
        let config = XceptionConfig::default();
        assert_eq!(config.input_shape, [299, 299, 3]);
        assert_eq!(XceptionConfig::new(), config);
    }

    #[test]
    fn test_config_builder() {
        let config = XceptionConfig::new().with_input_shape([71, 71, 1]);
        let graph = config.build().unwrap();
        assert_eq!(graph.input_shape(), Shape::spatial(71, 71, 1));
        assert_eq!(graph.output_shape(), Shape::flat(NUM_CLASSES));
    }

    #[test]
    fn test_zero_sized_input_is_rejected() {
        let result = XceptionConfig::new().with_input_shape([299, 0, 3]).build();
        assert!(matches!(
            result,
            Err(ModelError::InvalidConfiguration { operation: "input_layer", .. })
        ));
    }

    #[test]
    fn test_xception_has_twelve_residual_adds() {
        let graph = xception().unwrap();
        assert_eq!(graph.name(), MODEL_NAME);
        assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Add)), 12);
    }
}
