//! Network description consumed by the graph builder.
//!
//! A loader (out of scope for this crate) turns a persisted model into an
//! ordered list of [`Layer`]s. Layers refer to the tensors they consume by
//! data name; each data name is produced by exactly one layer output.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ForgeResult;
use crate::param_error;
use crate::tensor::{Blob, Data};

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    /// Operator type name, e.g. `ScaleShift`
    pub kind: String,
    /// Names of consumed data, in input port order
    pub inputs: Vec<String>,
    /// Produced data, in output port order
    pub outputs: Vec<Data>,
    pub params: BTreeMap<String, String>,
    /// Weights and other constant blobs
    pub blobs: BTreeMap<String, Blob>,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: BTreeMap::new(),
            blobs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, data: impl Into<String>) -> Self {
        self.inputs.push(data.into());
        self
    }

    pub fn with_output(mut self, data: Data) -> Self {
        self.outputs.push(data);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_blob(mut self, name: impl Into<String>, blob: Blob) -> Self {
        self.blobs.insert(name.into(), blob);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse an optional parameter, falling back to `default` when absent.
    pub fn param_or<T: FromStr>(&self, key: &str, default: T) -> ForgeResult<T> {
        match self.param(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| param_error!(self.name, key, "cannot parse {:?}", raw)),
        }
    }

    /// Parse a mandatory parameter.
    pub fn param_required<T: FromStr>(&self, key: &str) -> ForgeResult<T> {
        let raw = self
            .param(key)
            .ok_or_else(|| param_error!(self.name, key, "missing"))?;
        raw.trim()
            .parse()
            .map_err(|_| param_error!(self.name, key, "cannot parse {:?}", raw))
    }

    pub fn blob(&self, name: &str) -> Option<&Blob> {
        self.blobs.get(name)
    }
}

/// Ordered layer list plus the names of the data exposed as outputs.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub name: String,
    pub layers: Vec<Layer>,
    pub outputs: Vec<String>,
    /// Mean subtracted from an input on push, keyed by Input layer name.
    /// Either one value per channel or one per image element.
    pub mean_images: BTreeMap<String, Blob>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_output(mut self, data: impl Into<String>) -> Self {
        self.outputs.push(data.into());
        self
    }

    pub fn with_mean_image(mut self, input: impl Into<String>, mean: Blob) -> Self {
        self.mean_images.insert(input.into(), mean);
        self
    }

    pub fn add_layer(&mut self, layer: Layer) -> &mut Self {
        self.layers.push(layer);
        self
    }

    pub fn add_output(&mut self, data: impl Into<String>) -> &mut Self {
        self.outputs.push(data.into());
        self
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Mutable access for loaders that patch a parsed network (e.g. batch).
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    /// Change the batch dimension of every declared tensor.
    pub fn set_batch_size(&mut self, batch: usize) {
        for layer in &mut self.layers {
            for data in &mut layer.outputs {
                data.set_batch_size(batch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use crate::tensor::{Layout, Precision};

    #[test]
    fn test_param_parsing() {
        let layer = Layer::new("pool", "ROIPooling")
            .with_param("pooled_h", 2)
            .with_param("spatial_scale", "0.0625")
            .with_param("bad", "x");

        assert_eq!(layer.param_required::<usize>("pooled_h").unwrap(), 2);
        assert_eq!(layer.param_or::<f32>("spatial_scale", 1.0).unwrap(), 0.0625);
        assert_eq!(layer.param_or::<f32>("absent", 1.0).unwrap(), 1.0);
        assert!(matches!(
            layer.param_required::<usize>("pooled_w"),
            Err(ForgeError::InvalidParameter { .. })
        ));
        assert!(layer.param_or::<usize>("bad", 0).is_err());
    }

    #[test]
    fn test_network_set_batch_size() {
        let mut net = Network::new("n").with_layer(
            Layer::new("in", "Input").with_output(Data::with_dims(
                "in",
                vec![1, 3, 2, 2],
                Precision::FP32,
                Layout::NCHW,
            )),
        );
        net.set_batch_size(8);
        let data = &net.layer("in").unwrap().outputs[0];
        assert_eq!(data.dims().unwrap(), &[8, 3, 2, 2]);
    }
}
