//! ROI pooling inside a compiled graph

mod common;

use common::{blob, fp32, input};
use cpuforge::{ForgeError, Graph, Layer, Layout, Network, Precision};

fn roi_network(rois: usize, pooled: usize, spatial_scale: f32) -> Network {
    Network::new("roi")
        .with_layer(input("data", vec![1, 2, 4, 4], Precision::FP32, Layout::NCHW))
        .with_layer(input("rois", vec![rois, 5], Precision::FP32, Layout::NC))
        .with_layer(
            Layer::new("pool", "ROIPooling")
                .with_param("pooled_h", pooled)
                .with_param("pooled_w", pooled)
                .with_param("spatial_scale", spatial_scale)
                .with_input("data")
                .with_input("rois")
                .with_output(fp32("pooled", vec![rois, 2, pooled, pooled], Layout::NCHW)),
        )
        .with_output("pooled")
}

/// Channel 0 holds 0..16, channel 1 holds 100..116.
fn feature_map() -> Vec<f32> {
    (0..16)
        .map(|v| v as f32)
        .chain((0..16).map(|v| 100.0 + v as f32))
        .collect()
}

#[test]
fn test_roi_pooling_two_rois() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.build(&roi_network(2, 2, 1.0))?;

    graph.push_input("data", &blob(vec![1, 2, 4, 4], Precision::FP32, Layout::NCHW, &feature_map()))?;
    let rois = [
        0.0, 0.0, 0.0, 3.0, 3.0, // whole map
        0.0, 0.0, 0.0, 1.0, 1.0, // top-left 2x2
    ];
    graph.push_input("rois", &blob(vec![2, 5], Precision::FP32, Layout::NC, &rois))?;
    graph.infer()?;

    let pooled = graph.pull_outputs()?["pooled"].to_f32_vec();
    assert_eq!(
        pooled,
        vec![
            5.0, 7.0, 13.0, 15.0, // roi 0, channel 0
            105.0, 107.0, 113.0, 115.0, // roi 0, channel 1
            0.0, 1.0, 4.0, 5.0, // roi 1, channel 0
            100.0, 101.0, 104.0, 105.0, // roi 1, channel 1
        ]
    );
    Ok(())
}

#[test]
fn test_bad_batch_index_fails_inference() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.build(&roi_network(1, 1, 1.0))?;
    graph.push_input("rois", &blob(vec![1, 5], Precision::FP32, Layout::NC, &[3.0, 0.0, 0.0, 1.0, 1.0]))?;
    let err = graph.infer().unwrap_err();
    assert!(matches!(err, ForgeError::InvalidParameter { ref param, .. } if param == "rois"));

    // a failed pass leaves the graph usable
    assert!(graph.is_ready());
    graph.push_input("rois", &blob(vec![1, 5], Precision::FP32, Layout::NC, &[0.0, 0.0, 0.0, 1.0, 1.0]))?;
    graph.infer()?;
    Ok(())
}

#[test]
fn test_missing_pooled_size_is_rejected() {
    let mut net = roi_network(1, 1, 1.0);
    let layer = net.layer_mut("pool").unwrap();
    layer.params.remove("pooled_h");
    assert!(matches!(
        Graph::new().build(&net),
        Err(ForgeError::InvalidParameter { .. })
    ));
}
