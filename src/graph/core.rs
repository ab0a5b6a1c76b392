//! ModelGraph - graph structure without weights.
//!
//! This module contains the non-generic ModelGraph that represents
//! the computation graph structure. Weights are only created when
//! `compile()` is called.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::backend::Backend;

use super::buffer::{BufferId, DataBuffer, InputBuffer};
use super::model::CompiledModel;
use super::operation::OpKind;
use super::shape::Shape;
use crate::errors::ModelError;

/// Global counter for unique graph IDs.
static GRAPH_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier for a ModelGraph.
pub type GraphId = usize;

fn next_graph_id() -> GraphId {
    GRAPH_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// ModelGraph represents a named computation graph without weights.
///
/// Call `compile()` to create a `CompiledModel` with actual weight tensors.
///
/// # Example
///
/// ```
/// use xception::graph::{InputBuffer, ModelGraph, Shape, ops};
///
/// let input = InputBuffer::new(Shape::spatial(8, 8, 3));
/// let x = ops::conv2d(4, [3, 3], [2, 2], input.buffer()).unwrap();
/// let x = ops::global_avg_pool2d(x).unwrap();
/// let output = ops::dense(2, x).unwrap();
///
/// let graph = ModelGraph::new("tiny", input, output).unwrap();
/// assert_eq!(graph.output_shape(), Shape::flat(2));
/// assert_eq!(graph.nodes().len(), 4);
/// ```
#[derive(Clone, Debug)]
pub struct ModelGraph {
    /// Unique identifier for this graph
    id: GraphId,
    name: String,
    input: InputBuffer,
    /// Output buffer (carries the graph structure via producer chain)
    output: DataBuffer,
    /// Every reachable buffer in execution order, input first
    nodes: Vec<DataBuffer>,
}

impl ModelGraph {
    /// Creates a new ModelGraph from its input and output buffers.
    ///
    /// Fails with `InvalidGraph` if the output depends on any placeholder
    /// other than `input`.
    pub fn new(
        name: impl Into<String>,
        input: InputBuffer,
        output: DataBuffer,
    ) -> Result<Self, ModelError> {
        let mut traversal = Traversal::new(input.id());
        traversal.visit(&output)?;
        if traversal.order.first().map(DataBuffer::id) != Some(input.id()) {
            return Err(ModelError::InvalidGraph(
                "Output is not reachable from the declared input".to_string(),
            ));
        }

        Ok(Self {
            id: next_graph_id(),
            name: name.into(),
            input,
            output,
            nodes: traversal.order,
        })
    }

    /// Returns the unique ID of this graph.
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn output(&self) -> &DataBuffer {
        &self.output
    }

    pub fn input_shape(&self) -> Shape {
        self.input.shape()
    }

    pub fn output_shape(&self) -> Shape {
        self.output.shape()
    }

    /// Every buffer of the graph in execution order, starting with the input.
    pub fn nodes(&self) -> &[DataBuffer] {
        &self.nodes
    }

    /// Operation kinds in execution order.
    pub fn op_kinds(&self) -> impl Iterator<Item = &OpKind> {
        self.nodes
            .iter()
            .filter_map(|buffer| buffer.producer().map(|op| op.kind()))
    }

    /// Counts operations whose kind matches the predicate.
    pub fn count_layers(&self, predicate: impl Fn(&OpKind) -> bool) -> usize {
        self.op_kinds().filter(|kind| predicate(kind)).count()
    }

    /// Compiles this graph into a CompiledModel with initialized weights.
    ///
    /// This is where the actual weight tensors are created on the specified device.
    pub fn compile<B: Backend>(&self, device: &B::Device) -> Result<CompiledModel<B>, ModelError> {
        CompiledModel::new(self, device)
    }
}

/// Depth-first post-order walk from the output back to the input.
struct Traversal {
    input_id: BufferId,
    visited: HashSet<BufferId>,
    order: Vec<DataBuffer>,
}

impl Traversal {
    fn new(input_id: BufferId) -> Self {
        Self {
            input_id,
            visited: HashSet::new(),
            order: Vec::new(),
        }
    }

    fn visit(&mut self, buffer: &DataBuffer) -> Result<(), ModelError> {
        if self.visited.contains(&buffer.id()) {
            return Ok(());
        }

        if buffer.is_input() && buffer.id() != self.input_id {
            return Err(ModelError::InvalidGraph(format!(
                "Buffer {} is a placeholder other than the declared input",
                buffer.id()
            )));
        }

        for input in buffer.inputs() {
            self.visit(input)?;
        }

        self.visited.insert(buffer.id());
        self.order.push(buffer.clone());
        Ok(())
    }
}
