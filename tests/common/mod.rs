//! Shared network builders for integration tests
//!
//! Every builder returns a complete [`Network`] that compiles with the
//! built-in operators. Helpers producing blobs panic on bad input since
//! they only ever see literal test data.

#![allow(dead_code)]

use cpuforge::{Blob, Data, Layer, Layout, Network, Precision, TensorDesc};

pub fn input(name: &str, dims: Vec<usize>, precision: Precision, layout: Layout) -> Layer {
    Layer::new(name, "Input").with_output(Data::with_dims(name, dims, precision, layout))
}

pub fn fp32(name: &str, dims: Vec<usize>, layout: Layout) -> Data {
    Data::with_dims(name, dims, Precision::FP32, layout)
}

/// Blob holding `values` in memory order of `layout`.
pub fn blob(dims: Vec<usize>, precision: Precision, layout: Layout, values: &[f32]) -> Blob {
    Blob::from_f32(&TensorDesc::new(precision, dims, layout), values)
        .expect("test blob must match its dims")
}

pub fn vector(values: &[f32]) -> Blob {
    blob(vec![values.len()], Precision::FP32, Layout::C, values)
}

/// `y = x * weights + biases` over a rank-1 input.
pub fn scale_shift_network(len: usize, weights: &[f32], biases: &[f32]) -> Network {
    let mut layer = Layer::new("ss", "ScaleShift")
        .with_input("x")
        .with_output(fp32("y", vec![len], Layout::C));
    if !weights.is_empty() {
        layer = layer.with_blob("weights", vector(weights));
    }
    if !biases.is_empty() {
        layer = layer.with_blob("biases", vector(biases));
    }
    Network::new("scale_shift")
        .with_layer(input("x", vec![len], Precision::FP32, Layout::C))
        .with_layer(layer)
        .with_output("y")
}

/// `x -> relu_1 -> ... -> relu_n`, each writing `t{i}`; the last is the output.
pub fn relu_chain(len: usize, n: usize) -> Network {
    let mut net = Network::new("relu_chain").with_layer(input("x", vec![len], Precision::FP32, Layout::C));
    let mut prev = "x".to_string();
    for i in 1..=n {
        let out = format!("t{}", i);
        net.add_layer(
            Layer::new(format!("relu_{}", i), "ReLU")
                .with_input(prev.as_str())
                .with_output(fp32(&out, vec![len], Layout::C)),
        );
        prev = out;
    }
    net.add_output(prev);
    net
}

/// `sum(x, relu(x))` over an NCHW tensor, with a fan-out on `x`.
pub fn residual_network(dims: Vec<usize>, input_precision: Precision, input_layout: Layout) -> Network {
    Network::new("residual")
        .with_layer(input("x", dims.clone(), input_precision, input_layout))
        .with_layer(
            Layer::new("relu", "ReLU")
                .with_input("x")
                .with_output(fp32("r", dims.clone(), Layout::NCHW)),
        )
        .with_layer(
            Layer::new("sum", "Eltwise")
                .with_param("operation", "sum")
                .with_input("x")
                .with_input("r")
                .with_output(fp32("y", dims, Layout::NCHW)),
        )
        .with_output("y")
}

/// Expected `sum(x, relu(x))`.
pub fn residual(values: &[f32]) -> Vec<f32> {
    values.iter().map(|&v| v + v.max(0.0)).collect()
}
