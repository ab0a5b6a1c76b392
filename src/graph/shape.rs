//! Static tensor shapes with an implicit, unbound batch dimension.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// Shape of a tensor flowing through the graph, excluding the batch axis.
///
/// Spatial tensors use the channels-last layout `[height, width, channels]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Spatial {
        height: usize,
        width: usize,
        channels: usize,
    },
    Flat {
        features: usize,
    },
}

impl Shape {
    /// Creates a channels-last spatial shape.
    pub fn spatial(height: usize, width: usize, channels: usize) -> Self {
        Self::Spatial {
            height,
            width,
            channels,
        }
    }

    /// Creates a flat (feature vector) shape.
    pub fn flat(features: usize) -> Self {
        Self::Flat { features }
    }

    /// Size of the last axis: channels for spatial shapes, features otherwise.
    pub fn channels(&self) -> usize {
        match *self {
            Self::Spatial { channels, .. } => channels,
            Self::Flat { features } => features,
        }
    }

    /// Number of axes, excluding batch.
    pub fn rank(&self) -> usize {
        match self {
            Self::Spatial { .. } => 3,
            Self::Flat { .. } => 1,
        }
    }

    /// Dimensions excluding batch.
    pub fn dims(&self) -> Vec<usize> {
        match *self {
            Self::Spatial {
                height,
                width,
                channels,
            } => vec![height, width, channels],
            Self::Flat { features } => vec![features],
        }
    }

    /// Dimensions with the batch axis prepended.
    pub fn with_batch(&self, batch: usize) -> Vec<usize> {
        let mut dims = vec![batch];
        dims.extend(self.dims());
        dims
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, Self::Spatial { .. })
    }

    /// Returns `(height, width, channels)` or fails for flat shapes.
    pub(crate) fn expect_spatial(&self, operation: &'static str) -> Result<(usize, usize, usize), ModelError> {
        match *self {
            Self::Spatial {
                height,
                width,
                channels,
            } => Ok((height, width, channels)),
            Self::Flat { .. } => Err(ModelError::invalid_config(
                operation,
                format!("expected a spatial input of rank 3, got {self}"),
            )),
        }
    }

    /// Returns the feature count or fails for spatial shapes.
    pub(crate) fn expect_flat(&self, operation: &'static str) -> Result<usize, ModelError> {
        match *self {
            Self::Flat { features } => Ok(features),
            Self::Spatial { .. } => Err(ModelError::invalid_config(
                operation,
                format!("expected a flat input of rank 1, got {self}"),
            )),
        }
    }
}

impl fmt::Display for Shape {
    /// Formats like Keras summaries: `(None, 150, 150, 32)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(None")?;
        for dim in self.dims() {
            write!(f, ", {dim}")?;
        }
        write!(f, ")")
    }
}

/// Padding along one spatial axis under the "same" policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamePadding {
    pub output: usize,
    pub before: usize,
    pub after: usize,
}

impl SamePadding {
    /// Output size is `ceil(size / stride)`; odd total padding puts the extra
    /// row or column after the data.
    pub fn new(size: usize, kernel: usize, stride: usize) -> Self {
        let output = size.div_ceil(stride);
        let total = ((output.saturating_sub(1)) * stride + kernel).saturating_sub(size);
        let before = total / 2;
        Self {
            output,
            before,
            after: total - before,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.before == 0 && self.after == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::spatial(150, 150, 32).to_string(), "(None, 150, 150, 32)");
        assert_eq!(Shape::flat(1000).to_string(), "(None, 1000)");
    }

    #[test]
    fn test_shape_dims_with_batch() {
        let shape = Shape::spatial(299, 299, 3);
        assert_eq!(shape.with_batch(1), vec![1, 299, 299, 3]);
        assert_eq!(shape.channels(), 3);
        assert_eq!(shape.rank(), 3);
        assert_eq!(Shape::flat(7).with_batch(2), vec![2, 7]);
    }

    #[test]
    fn test_expect_rank() {
        assert!(Shape::flat(4).expect_spatial("conv2d").is_err());
        assert!(Shape::spatial(2, 2, 4).expect_flat("dense").is_err());
        assert_eq!(Shape::flat(4).expect_flat("dense").unwrap(), 4);
    }

    #[test]
    fn test_same_padding_stride_one_preserves_size() {
        let pad = SamePadding::new(147, 3, 1);
        assert_eq!(pad.output, 147);
        assert_eq!((pad.before, pad.after), (1, 1));
    }

    #[test]
    fn test_same_padding_stride_two_rounds_up() {
        let pad = SamePadding::new(299, 3, 2);
        assert_eq!(pad.output, 150);
        assert_eq!((pad.before, pad.after), (1, 1));

        let pad = SamePadding::new(74, 3, 2);
        assert_eq!(pad.output, 37);
        assert_eq!((pad.before, pad.after), (0, 1));
    }

    #[test]
    fn test_same_padding_pointwise_stride_two_needs_none() {
        let pad = SamePadding::new(147, 1, 2);
        assert_eq!(pad.output, 74);
        assert!(pad.is_zero());
    }
}
