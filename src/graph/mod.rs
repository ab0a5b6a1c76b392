//! Functional graph API for building neural networks.
//!
//! Graphs are assembled from immutable [`DataBuffer`] handles by applying
//! operations from [`ops`]; shapes are inferred and checked as each node is
//! created.
//!
//! # Example
//!
//! ```
//! use xception::graph::{InputBuffer, ModelGraph, Shape, ops};
//! use burn::backend::NdArray;
//! use burn::tensor::backend::Backend;
//!
//! type TestBackend = NdArray;
//! let device = <TestBackend as Backend>::Device::default();
//!
//! // Create input and build graph (no device needed)
//! let input = InputBuffer::new(Shape::spatial(16, 16, 3));
//! let x = ops::conv2d(8, [3, 3], [2, 2], input.buffer()).unwrap();
//! let x = ops::relu(ops::batch_norm(x).unwrap()).unwrap();
//! let x = ops::global_avg_pool2d(x).unwrap();
//! let output = ops::softmax(ops::dense(10, x).unwrap()).unwrap();
//! let graph = ModelGraph::new("small", input, output).unwrap();
//!
//! // Compile to create weights on device
//! let model = graph.compile::<TestBackend>(&device).unwrap();
//! assert_eq!(model.output_shape(), Shape::flat(10));
//! ```

mod buffer;
mod core;
mod model;
mod operation;
mod shape;
mod summary;

pub use buffer::{BufferId, DataBuffer, InputBuffer};
pub use self::core::{GraphId, ModelGraph};
pub use model::CompiledModel;
pub use operation::{DEFAULT_BATCH_NORM_EPSILON, OpId, OpKind, Operation, ops};
pub use shape::{SamePadding, Shape};
pub use summary::{LayerSpec, ParamCount};
