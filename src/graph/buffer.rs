//! DataBuffer and InputBuffer - core graph node types.
//!
//! These structures represent tensors flowing through the computation graph.
//! A buffer is immutable once produced; cloning one shares the same node.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::operation::Operation;
use super::shape::Shape;

/// Global counter for unique buffer IDs.
static BUFFER_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier for a DataBuffer.
pub type BufferId = usize;

#[derive(Debug)]
struct BufferNode {
    id: BufferId,
    shape: Shape,
    producer: Option<Operation>,
    inputs: Vec<DataBuffer>,
}

/// DataBuffer represents a node in the computation graph.
///
/// It tracks:
/// - The static shape of the data (batch excluded)
/// - The operation that produced it (if any)
/// - The input buffers used by that operation
#[derive(Clone, Debug)]
pub struct DataBuffer {
    node: Arc<BufferNode>,
}

impl DataBuffer {
    /// Creates a new DataBuffer with the given shape and producer.
    pub(crate) fn new(shape: Shape, producer: Option<Operation>, inputs: Vec<DataBuffer>) -> Self {
        Self {
            node: Arc::new(BufferNode {
                id: BUFFER_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
                shape,
                producer,
                inputs,
            }),
        }
    }

    /// Returns the unique ID of this buffer.
    pub fn id(&self) -> BufferId {
        self.node.id
    }

    /// Returns the shape of this buffer.
    pub fn shape(&self) -> Shape {
        self.node.shape
    }

    /// Returns true if this is an input buffer (no producer).
    pub fn is_input(&self) -> bool {
        self.node.producer.is_none()
    }

    /// Returns the producer operation, if any.
    pub fn producer(&self) -> Option<&Operation> {
        self.node.producer.as_ref()
    }

    /// Returns the input buffers.
    pub fn inputs(&self) -> &[DataBuffer] {
        &self.node.inputs
    }
}

/// InputBuffer represents an input to the computation graph.
///
/// This is the entry point for data into the model.
#[derive(Clone, Debug)]
pub struct InputBuffer {
    buffer: DataBuffer,
}

impl InputBuffer {
    /// Creates a new InputBuffer with the given shape.
    pub fn new(shape: Shape) -> Self {
        Self {
            buffer: DataBuffer::new(shape, None, vec![]),
        }
    }

    /// Returns the DataBuffer for use in graph building.
    pub fn buffer(&self) -> DataBuffer {
        self.buffer.clone()
    }

    /// Returns the shape of this input.
    pub fn shape(&self) -> Shape {
        self.buffer.shape()
    }

    /// Returns the buffer ID.
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::ops;

    #[test]
    fn test_input_buffer_creation() {
        let input = InputBuffer::new(Shape::spatial(299, 299, 3));
        assert_eq!(input.shape(), Shape::spatial(299, 299, 3));
        assert!(input.buffer().is_input());
        assert!(input.buffer().producer().is_none());
    }

    #[test]
    fn test_buffer_ids_are_unique() {
        let input1 = InputBuffer::new(Shape::flat(4));
        let input2 = InputBuffer::new(Shape::flat(4));
        assert_ne!(input1.id(), input2.id());
    }

    #[test]
    fn test_data_buffer_clone_shares_node() {
        let input = InputBuffer::new(Shape::flat(4));
        let buf1 = input.buffer();
        let buf2 = input.buffer();
        assert_eq!(buf1.id(), buf2.id());
    }

    #[test]
    fn test_produced_buffer_links_inputs() {
        let input = InputBuffer::new(Shape::spatial(4, 4, 3));
        let output = ops::relu(input.buffer()).unwrap();

        assert!(!output.is_input());
        assert_eq!(output.inputs().len(), 1);
        assert_eq!(output.inputs()[0].id(), input.id());
        assert!(output.producer().is_some());
    }
}
