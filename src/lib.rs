//! # xception
//!
//! The Xception image-classification network as a functional computation graph.
//!
//! This library assembles the network from immutable tensor handles: every
//! operation infers and checks its output shape as it is added, so a graph
//! either builds completely or fails with a [`ModelError`] naming the
//! offending operation.
//!
//! ## Features
//!
//! - **Weight-free graphs**: [`ModelGraph`] describes the structure only and can
//!   be built any number of times, for any input size.
//! - **Inspection**: Keras-style [`ModelGraph::summary`], per-layer
//!   [`LayerSpec`](graph::LayerSpec)s and JSON export.
//! - **Burn Backend**: [`ModelGraph::compile`] instantiates Burn layers on any
//!   backend and runs a forward pass.
//!
//! ## Example
//!
//! ```
//! use xception::prelude::*;
//! use burn::backend::NdArray;
//! use burn::tensor::{Tensor, backend::Backend};
//!
//! type TestBackend = NdArray;
//!
//! let device = <TestBackend as Backend>::Device::default();
//!
//! // The full network for 299x299 RGB images
//! let graph = xception().expect("Failed to build graph");
//! assert_eq!(graph.output_shape(), Shape::flat(1000));
//! assert!(graph.summary().contains("Model: \"Xception\""));
//!
//! // A reduced input size keeps a CPU forward pass cheap
//! let model = XceptionConfig::new()
//!     .with_input_shape([32, 32, 3])
//!     .build()
//!     .and_then(|graph| graph.compile::<TestBackend>(&device))
//!     .expect("Failed to compile model");
//! let probabilities = model
//!     .forward(Tensor::zeros([1, 32, 32, 3], &device))
//!     .unwrap();
//! assert_eq!(probabilities.dims(), [1, 1000]);
//! ```

pub mod errors;
pub mod graph;
pub mod layers;
pub mod xception;

// Re-exports for convenience
pub use errors::ModelError;
pub use graph::{CompiledModel, ModelGraph};
pub use xception::{XceptionConfig, xception};

/// Backend type for inference on the GPU.
pub type InferenceBackend = burn::backend::Wgpu;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::InferenceBackend;
    pub use crate::errors::ModelError;
    pub use crate::graph::{CompiledModel, DataBuffer, InputBuffer, ModelGraph, Shape, ops};
    pub use crate::layers::{Activation, ConvVariant};
    pub use crate::xception::{ConvUnit, XceptionConfig, sep_conv_unit, xception};
}
