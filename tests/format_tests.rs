//! Format selection and reorder insertion tests

mod common;

use common::{blob, fp32, input, residual, residual_network};
use cpuforge::{EdgeStatus, Graph, Layer, Layout, Network, OperatorKind, Precision};

fn reorder_count(graph: &Graph) -> usize {
    graph
        .nodes()
        .iter()
        .filter(|n| n.kind() == OperatorKind::Reorder)
        .count()
}

#[test]
fn test_agreeing_formats_insert_no_reorder() -> anyhow::Result<()> {
    let dims = vec![1, 2, 2, 2];
    let mut graph = Graph::new();
    graph.build(&residual_network(dims.clone(), Precision::FP32, Layout::NCHW))?;

    assert_eq!(reorder_count(&graph), 0);
    for node in graph.nodes() {
        if matches!(node.kind(), OperatorKind::ReLU | OperatorKind::Eltwise) {
            assert_eq!(node.exec_type(), "native_FP32", "node {}", node.name());
        }
    }

    let values: Vec<f32> = (0..8).map(|v| v as f32 - 4.0).collect();
    graph.push_input("x", &blob(dims, Precision::FP32, Layout::NCHW, &values))?;
    graph.infer()?;
    assert_eq!(graph.pull_outputs()?["y"].to_f32_vec(), residual(&values));
    Ok(())
}

#[test]
fn test_precision_mismatch_inserts_one_shared_reorder() -> anyhow::Result<()> {
    let dims = vec![1, 2, 2, 2];
    let mut graph = Graph::new();
    graph.build(&residual_network(dims.clone(), Precision::U8, Layout::NCHW))?;

    // relu and sum both want FP32 NCHW from the same U8 edge
    assert_eq!(reorder_count(&graph), 1);
    let reorder = graph
        .nodes()
        .iter()
        .find(|n| n.kind() == OperatorKind::Reorder)
        .unwrap();
    assert_eq!(reorder.exec_type(), "ref_FP32");
    let out_edge = &graph.edges()[reorder.outputs()[0].0];
    assert_eq!(out_edge.desc().precision, Precision::FP32);
    assert_eq!(out_edge.consumers().len(), 2);

    let values: Vec<f32> = (0..8).map(|v| v as f32).collect();
    graph.push_input("x", &blob(dims, Precision::U8, Layout::NCHW, &values))?;
    graph.infer()?;
    assert_eq!(graph.pull_outputs()?["y"].to_f32_vec(), residual(&values));
    Ok(())
}

#[test]
fn test_nhwc_input_computes_logical_result() -> anyhow::Result<()> {
    let dims = vec![1, 2, 2, 2];
    let mut graph = Graph::new();
    graph.build(&residual_network(dims.clone(), Precision::FP32, Layout::NHWC))?;

    // logical NCHW values, handed over in NHWC memory order
    let logical: Vec<f32> = vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0];
    let nhwc: Vec<f32> = vec![1.0, 5.0, -2.0, -6.0, 3.0, 7.0, -4.0, -8.0];
    graph.push_input("x", &blob(dims, Precision::FP32, Layout::NHWC, &nhwc))?;
    graph.infer()?;

    let y = &graph.pull_outputs()?["y"];
    assert_eq!(y.desc().layout, Layout::NCHW);
    assert_eq!(y.to_f32_vec(), residual(&logical));
    Ok(())
}

#[test]
fn test_consumer_wanting_other_layout_gets_reorder() -> anyhow::Result<()> {
    // ROI pooling only reads NCHW data; feed it from an NHWC input
    let net = Network::new("roi_nhwc")
        .with_layer(input("data", vec![1, 1, 2, 2], Precision::FP32, Layout::NHWC))
        .with_layer(input("rois", vec![1, 5], Precision::FP32, Layout::NC))
        .with_layer(
            Layer::new("roi", "ROIPooling")
                .with_param("pooled_h", 1)
                .with_param("pooled_w", 1)
                .with_input("data")
                .with_input("rois")
                .with_output(fp32("pooled", vec![1, 1, 1, 1], Layout::NCHW)),
        )
        .with_output("pooled");

    let mut graph = Graph::new();
    graph.build(&net)?;
    assert_eq!(reorder_count(&graph), 1);

    let compiled = graph.compiled()?;
    let roi = compiled.find_node("roi").unwrap();
    let data_edge = compiled.edge(roi.inputs()[0]);
    assert_eq!(data_edge.desc().layout, Layout::NCHW);
    assert_eq!(
        compiled.node(data_edge.producer()).kind(),
        OperatorKind::Reorder
    );

    graph.push_input("data", &blob(vec![1, 1, 2, 2], Precision::FP32, Layout::NHWC, &[1.0, 9.0, 3.0, 4.0]))?;
    graph.push_input("rois", &blob(vec![1, 5], Precision::FP32, Layout::NC, &[0.0, 0.0, 0.0, 1.0, 1.0]))?;
    graph.infer()?;
    assert_eq!(graph.pull_outputs()?["pooled"].to_f32_vec(), vec![9.0]);
    Ok(())
}

#[test]
fn test_every_edge_is_planned() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.build(&residual_network(vec![1, 2, 2, 2], Precision::U8, Layout::NCHW))?;
    for edge in graph.edges() {
        assert_ne!(edge.status(), EdgeStatus::Unallocated, "edge {}", edge.name());
        assert!(edge.desc().is_resolved());
    }
    Ok(())
}
