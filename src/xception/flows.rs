//! The three macro-stages of the network.

use crate::errors::ModelError;
use crate::graph::{DataBuffer, ops};

use super::units::{ConvUnit, conv_unit, sep_conv_unit};

/// Filters of the two stem convolutions.
pub const STEM_FILTERS: [usize; 2] = [32, 64];
/// Filters of the downsampling residual blocks of the entry flow, in order.
pub const ENTRY_FLOW_FILTERS: [usize; 3] = [128, 256, 728];
/// Channel depth of the middle flow.
pub const MIDDLE_FLOW_CHANNELS: usize = 728;
/// Number of residual blocks in the middle flow.
pub const MIDDLE_FLOW_REPEATS: usize = 8;
/// Separable units per middle flow block.
pub const MIDDLE_FLOW_DEPTH: usize = 3;
/// Separable units of the exit flow residual block.
pub const EXIT_FLOW_FILTERS: [usize; 2] = [728, 1024];
/// Post-activated separable units after the exit flow residual block.
pub const EXIT_FLOW_EXPANSION: [usize; 2] = [1536, 2048];
pub const CLASSIFIER_HIDDEN_UNITS: usize = 2048;
pub const NUM_CLASSES: usize = 1000;

const POOL_SIZE: [usize; 2] = [3, 3];
const DOWNSAMPLE_STRIDES: [usize; 2] = [2, 2];

/// Builds one residual block: a stack of default separable units on the main
/// branch, added back to the block input.
///
/// With `downsample`, the main branch ends in a 3x3/2 max-pool and the
/// residual branch is a linear 1x1 stride-2 projection to `filters.last()`.
/// Otherwise the residual branch is the input itself.
pub fn residual_block(
    input: &DataBuffer,
    filters: &[usize],
    downsample: bool,
) -> Result<DataBuffer, ModelError> {
    let Some(&out_filters) = filters.last() else {
        return Err(ModelError::invalid_config(
            "residual_block",
            "at least one separable unit is required",
        ));
    };

    let residual = if downsample {
        ConvUnit::new(out_filters, [1, 1])
            .with_strides(DOWNSAMPLE_STRIDES)
            .with_post_activation(false)
            .apply(input)?
    } else {
        input.clone()
    };

    let mut main = input.clone();
    for &f in filters {
        main = sep_conv_unit(&main, f)?;
    }
    if downsample {
        main = ops::max_pool2d(POOL_SIZE, DOWNSAMPLE_STRIDES, main)?;
    }

    ops::add(vec![residual, main])
}

/// Entry flow: two stem convolutions, then three downsampling residual blocks.
///
/// A 299x299x3 input yields 19x19x728.
pub fn entry_flow(input: &DataBuffer) -> Result<DataBuffer, ModelError> {
    let mut x = conv_unit(input, STEM_FILTERS[0], [3, 3], DOWNSAMPLE_STRIDES)?;
    x = conv_unit(&x, STEM_FILTERS[1], [3, 3], [1, 1])?;

    for filters in ENTRY_FLOW_FILTERS {
        x = residual_block(&x, &[filters, filters], true)?;
        log::debug!("entry flow block ({filters} filters): {}", x.shape());
    }
    Ok(x)
}

/// Middle flow: eight shape-preserving residual blocks of three separable units.
///
/// The input must have 728 channels; any other depth fails at the first add.
pub fn middle_flow(input: &DataBuffer) -> Result<DataBuffer, ModelError> {
    let filters = [MIDDLE_FLOW_CHANNELS; MIDDLE_FLOW_DEPTH];
    let mut x = input.clone();
    for _ in 0..MIDDLE_FLOW_REPEATS {
        x = residual_block(&x, &filters, false)?;
    }
    log::debug!("middle flow: {}", x.shape());
    Ok(x)
}

/// Exit flow: one downsampling residual block, two post-activated separable
/// units, global average pooling and the classifier head.
pub fn exit_flow(input: &DataBuffer) -> Result<DataBuffer, ModelError> {
    let mut x = residual_block(input, &EXIT_FLOW_FILTERS, true)?;

    for filters in EXIT_FLOW_EXPANSION {
        x = ConvUnit::separable(filters)
            .with_pre_activation(false)
            .with_post_activation(true)
            .apply(&x)?;
    }
    log::debug!("exit flow features: {}", x.shape());

    x = ops::global_avg_pool2d(x)?;
    x = ops::relu(ops::dense(CLASSIFIER_HIDDEN_UNITS, x)?)?;
    ops::softmax(ops::dense(NUM_CLASSES, x)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InputBuffer, LayerSpec, ModelGraph, OpKind, Shape};
    use crate::layers::{Activation, ConvVariant};

    fn stage(shape: Shape, build: fn(&DataBuffer) -> Result<DataBuffer, ModelError>) -> ModelGraph {
        let input = InputBuffer::new(shape);
        let output = build(&input.buffer()).unwrap();
        ModelGraph::new("stage", input, output).unwrap()
    }

    fn find<'a>(layers: &'a [LayerSpec], name: &str) -> &'a LayerSpec {
        layers.iter().find(|l| l.name == name).unwrap()
    }

    fn is_relu(layer: &LayerSpec) -> bool {
        layer.op
            == Some(OpKind::Activation {
                activation: Activation::Relu,
            })
    }

    fn is_separable(kind: &OpKind) -> bool {
        matches!(
            kind,
            OpKind::Conv2d {
                variant: ConvVariant::Separable,
                ..
            }
        )
    }

    #[test]
    fn test_residual_block_requires_filters() {
        let input = InputBuffer::new(Shape::spatial(8, 8, 4));
        assert!(matches!(
            residual_block(&input.buffer(), &[], true),
            Err(ModelError::InvalidConfiguration { operation: "residual_block", .. })
        ));
    }

    #[test]
    fn test_residual_block_shapes() {
        let input = InputBuffer::new(Shape::spatial(9, 9, 16));
        let down = residual_block(&input.buffer(), &[24, 32], true).unwrap();
        assert_eq!(down.shape(), Shape::spatial(5, 5, 32));

        let same = residual_block(&input.buffer(), &[16, 16], false).unwrap();
        assert_eq!(same.shape(), Shape::spatial(9, 9, 16));
    }

    #[test]
    fn test_identity_residual_requires_matching_depth() {
        let input = InputBuffer::new(Shape::spatial(9, 9, 16));
        assert!(matches!(
            residual_block(&input.buffer(), &[32], false),
            Err(ModelError::ShapeMismatch { operation: "add", .. })
        ));
    }

    #[test]
    fn test_entry_flow_output_shape() {
        let graph = stage(Shape::spatial(299, 299, 3), entry_flow);
        assert_eq!(graph.output_shape(), Shape::spatial(19, 19, 728));
    }

    #[test]
    fn test_entry_flow_residual_projections() {
        let graph = stage(Shape::spatial(299, 299, 3), entry_flow);
        let layers = graph.layers();
        let adds: Vec<&LayerSpec> = layers.iter().filter(|l| l.op == Some(OpKind::Add)).collect();
        assert_eq!(adds.len(), 3);

        for (add, filters) in adds.iter().zip(ENTRY_FLOW_FILTERS) {
            // The residual input is the normalized projection itself: no relu in between.
            let norm = find(&layers, &add.inputs[0]);
            assert!(matches!(norm.op, Some(OpKind::BatchNorm { .. })));

            let projection = find(&layers, &norm.inputs[0]);
            assert_eq!(
                projection.op,
                Some(OpKind::Conv2d {
                    filters,
                    kernel_size: [1, 1],
                    strides: [2, 2],
                    variant: ConvVariant::Standard,
                })
            );

            let pool = find(&layers, &add.inputs[1]);
            assert!(matches!(pool.op, Some(OpKind::MaxPool2d { .. })));
            assert_eq!(pool.output_shape, norm.output_shape);
        }
    }

    #[test]
    fn test_entry_flow_separable_units_are_pre_activated() {
        let graph = stage(Shape::spatial(299, 299, 3), entry_flow);
        let layers = graph.layers();
        let separable: Vec<&LayerSpec> = layers
            .iter()
            .filter(|l| l.op.as_ref().is_some_and(is_separable))
            .collect();
        assert_eq!(separable.len(), 6);
        for conv in separable {
            assert!(is_relu(find(&layers, &conv.inputs[0])));
        }
    }

    #[test]
    fn test_middle_flow_is_shape_preserving() {
        for shape in [
            Shape::spatial(19, 19, 728),
            Shape::spatial(2, 2, 728),
            Shape::spatial(7, 3, 728),
        ] {
            let graph = stage(shape, middle_flow);
            assert_eq!(graph.output_shape(), shape);
        }
    }

    #[test]
    fn test_middle_flow_counts() {
        let graph = stage(Shape::spatial(19, 19, 728), middle_flow);
        assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Add)), 8);
        assert_eq!(graph.count_layers(is_separable), 24);
        assert_eq!(graph.count_layers(|k| matches!(k, OpKind::BatchNorm { .. })), 24);
        assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Activation { .. })), 24);
    }

    #[test]
    fn test_middle_flow_rejects_other_depths() {
        let input = InputBuffer::new(Shape::spatial(19, 19, 64));
        assert!(matches!(
            middle_flow(&input.buffer()),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_exit_flow_output() {
        let graph = stage(Shape::spatial(19, 19, 728), exit_flow);
        assert_eq!(graph.output_shape(), Shape::flat(NUM_CLASSES));
        assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Add)), 1);

        let layers = graph.layers();
        let tail: Vec<Option<OpKind>> = layers.iter().rev().take(5).map(|l| l.op.clone()).collect();
        assert_eq!(
            tail,
            vec![
                Some(OpKind::Activation {
                    activation: Activation::Softmax
                }),
                Some(OpKind::Dense { units: 1000 }),
                Some(OpKind::Activation {
                    activation: Activation::Relu
                }),
                Some(OpKind::Dense { units: 2048 }),
                Some(OpKind::GlobalAvgPool2d),
            ]
        );
    }

    #[test]
    fn test_exit_flow_expansion_units_are_post_activated() {
        let graph = stage(Shape::spatial(19, 19, 728), exit_flow);
        let layers = graph.layers();

        let expansion: Vec<&LayerSpec> = layers
            .iter()
            .filter(|l| matches!(l.op, Some(OpKind::Conv2d { filters: 1536 | 2048, .. })))
            .collect();
        assert_eq!(expansion.len(), 2);
        assert!(expansion.iter().all(|l| l.op.as_ref().is_some_and(is_separable)));

        // Not pre-activated: the 1536 unit reads the residual sum directly.
        let first_input = find(&layers, &expansion[0].inputs[0]);
        assert_eq!(first_input.op, Some(OpKind::Add));

        // Post-activated: conv -> norm -> relu -> conv -> norm -> relu -> pool.
        for conv in &expansion {
            let norm = layers.iter().find(|l| l.inputs == [conv.name.clone()]).unwrap();
            assert!(matches!(norm.op, Some(OpKind::BatchNorm { .. })));
            let relu = layers.iter().find(|l| l.inputs == [norm.name.clone()]).unwrap();
            assert!(is_relu(relu));
        }
        let pool = layers.iter().find(|l| l.op == Some(OpKind::GlobalAvgPool2d)).unwrap();
        assert!(is_relu(find(&layers, &pool.inputs[0])));

        // The default separable unit would place exactly the opposite activations.
        let default_unit = ConvUnit::separable(1536);
        assert!(default_unit.pre_activation && !default_unit.post_activation);
    }

    #[test]
    fn test_exit_flow_residual_block_separable_units_keep_defaults() {
        let graph = stage(Shape::spatial(19, 19, 728), exit_flow);
        let layers = graph.layers();
        for filters in EXIT_FLOW_FILTERS {
            let conv = layers
                .iter()
                .find(|l| {
                    l.op.as_ref().is_some_and(|k| {
                        is_separable(k) && matches!(k, OpKind::Conv2d { filters: f, .. } if *f == filters)
                    })
                })
                .unwrap();
            assert!(is_relu(find(&layers, &conv.inputs[0])));
        }
    }
}
