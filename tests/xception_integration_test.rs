//! End-to-end tests: assembling the full network, inspecting it and running
//! a forward pass on the CPU backend.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor, backend::Backend};
use xception::graph::{InputBuffer, ModelGraph, OpKind, Shape};
use xception::layers::{Activation, ConvVariant};
use xception::xception::{XceptionConfig, entry_flow, xception};
use xception::ModelError;

type TestBackend = NdArray;

const TOLERANCE: f32 = 1e-4;

#[test]
fn test_default_network_shapes() {
    let graph = xception().expect("Graph build should succeed");

    assert_eq!(graph.name(), "Xception");
    assert_eq!(graph.input_shape(), Shape::spatial(299, 299, 3));
    assert_eq!(graph.output_shape(), Shape::flat(1000));

    let layers = graph.layers();
    let gap = layers
        .iter()
        .find(|l| l.op == Some(OpKind::GlobalAvgPool2d))
        .expect("Network should pool globally");
    assert_eq!(gap.output_shape, Shape::flat(2048));

    let last_spatial = layers
        .iter()
        .rev()
        .find(|l| l.output_shape.is_spatial())
        .expect("Network should have spatial layers");
    assert_eq!(last_spatial.output_shape, Shape::spatial(10, 10, 2048));
}

#[test]
fn test_entry_flow_output() {
    let input = InputBuffer::new(Shape::spatial(299, 299, 3));
    let x = entry_flow(&input.buffer()).unwrap();
    assert_eq!(x.shape(), Shape::spatial(19, 19, 728));
}

#[test]
fn test_layer_composition() {
    let graph = xception().unwrap();

    assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Add)), 12);
    assert_eq!(
        graph.count_layers(|k| matches!(k, OpKind::MaxPool2d { .. })),
        4
    );
    assert_eq!(
        graph.count_layers(|k| matches!(
            k,
            OpKind::Conv2d {
                variant: ConvVariant::Separable,
                ..
            }
        )),
        34
    );
    assert_eq!(
        graph.count_layers(|k| matches!(
            k,
            OpKind::Conv2d {
                variant: ConvVariant::Standard,
                ..
            }
        )),
        6
    );
    assert_eq!(graph.count_layers(|k| matches!(k, OpKind::BatchNorm { .. })), 40);
    assert_eq!(graph.count_layers(|k| matches!(k, OpKind::Dense { .. })), 2);
    assert_eq!(
        graph.count_layers(|k| *k
            == OpKind::Activation {
                activation: Activation::Softmax
            }),
        1
    );
}

#[test]
fn test_parameter_counts() {
    let params = xception().unwrap().num_params();

    assert_eq!(params.non_trainable, 54_528);
    assert_eq!(params.trainable, 27_052_304);
    assert_eq!(params.total(), 27_106_832);
}

#[test]
fn test_builds_are_structurally_identical() {
    let first = xception().unwrap();
    let second = xception().unwrap();

    assert_eq!(first.layers(), second.layers());
    assert_eq!(first.nodes().len(), second.nodes().len());

    // Each build creates its own graph objects.
    assert_ne!(first.id(), second.id());
    assert_ne!(first.input().id(), second.input().id());
    assert_ne!(first.output().id(), second.output().id());
}

#[test]
fn test_summary_and_json_export() {
    let graph = xception().unwrap();

    let summary = graph.summary();
    assert!(summary.starts_with("Model: \"Xception\""));
    assert!(summary.contains("input_layer (InputLayer)"));
    assert!(summary.contains("separable_conv2d_33 (SeparableConv2D)"));
    assert!(summary.contains("Total params: 27,106,832"));
    assert!(summary.contains("Non-trainable params: 54,528"));

    let json = graph.to_json().expect("Export should succeed");
    let value: serde_json::Value = serde_json::from_str(&json).expect("JSON should be valid");
    assert_eq!(value["name"], "Xception");
    assert_eq!(value["output_shape"]["flat"]["features"], 1000);
    assert_eq!(
        value["layers"].as_array().map(Vec::len),
        Some(graph.nodes().len())
    );
    assert_eq!(value["params"]["non_trainable"], 54_528);
}

#[test]
fn test_invalid_input_shapes() {
    let result = XceptionConfig::new().with_input_shape([0, 299, 3]).build();
    assert!(matches!(
        result,
        Err(ModelError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_reduced_input_forward_pass() {
    let device = <TestBackend as Backend>::Device::default();

    let graph: ModelGraph = XceptionConfig::new()
        .with_input_shape([32, 32, 3])
        .build()
        .expect("Graph build should succeed");
    let model = graph
        .compile::<TestBackend>(&device)
        .expect("Compilation should succeed");
    assert_eq!(model.num_params(), graph.num_params());

    let input = Tensor::<TestBackend, 4>::random([2, 32, 32, 3], Distribution::Default, &device);
    let output = model.forward(input).expect("Forward pass should succeed");
    assert_eq!(output.dims(), [2, 1000]);

    let values: Vec<f32> = output.to_data().to_vec().unwrap();
    for row in values.chunks(1000) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < TOLERANCE, "row sums to {sum}");
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}

#[test]
fn test_forward_rejects_wrong_input_shape() {
    let device = <TestBackend as Backend>::Device::default();
    let model = XceptionConfig::new()
        .with_input_shape([32, 32, 3])
        .build()
        .and_then(|graph| graph.compile::<TestBackend>(&device))
        .unwrap();

    let result = model.forward(Tensor::zeros([1, 32, 32, 1], &device));
    assert!(matches!(
        result,
        Err(ModelError::ShapeMismatch {
            operation: "forward",
            ..
        })
    ));
}

#[test]
#[ignore = "full-resolution forward pass is slow on the CPU backend"]
fn test_full_resolution_forward_pass() {
    let device = <TestBackend as Backend>::Device::default();
    let model = xception()
        .and_then(|graph| graph.compile::<TestBackend>(&device))
        .unwrap();

    let output = model
        .forward(Tensor::zeros([1, 299, 299, 3], &device))
        .unwrap();
    assert_eq!(output.dims(), [1, 1000]);
}
