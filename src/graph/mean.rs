//! Mean image subtracted from a network input as it is pushed.
//!
//! A mean is either one value per channel or a whole image (every axis
//! below the batch). It is expanded once at build time into one value per
//! memory position of the input edge, so applying it is a single pass.

use crate::error::{ForgeError, ForgeResult};
use crate::ops::offset_map;
use crate::tensor::{element_count, Blob, Layout, Precision, TensorDesc};

#[derive(Debug, Clone, PartialEq)]
pub struct MeanImage {
    /// Value to subtract at each memory position of the input
    values: Vec<f32>,
}

impl MeanImage {
    /// Expand `mean` over the input edge described by `input`.
    pub fn new(name: &str, mean: &Blob, input: &TensorDesc) -> ForgeResult<Self> {
        if input.precision != Precision::FP32 {
            return Err(ForgeError::InvalidNetwork(format!(
                "mean image for '{}' needs an FP32 input, found {}",
                name, input.precision
            )));
        }

        let dims = &input.dims;
        let rank = dims.len();
        let channel_axis = Layout::default_for_rank(rank).channel_axis(rank);
        let image_axes = match channel_axis {
            Some(1) => 1,
            _ => 0,
        };
        let image_len = element_count(&dims[image_axes..]);
        let logical = logical_values(mean);

        let lookup: Box<dyn Fn(usize) -> f32> = if logical.len() == image_len {
            Box::new(move |i| logical[i % image_len.max(1)])
        } else if let Some(axis) = channel_axis.filter(|&a| dims[a] == logical.len()) {
            let inner = element_count(&dims[axis + 1..]).max(1);
            let channels = dims[axis].max(1);
            Box::new(move |i| logical[(i / inner) % channels])
        } else {
            return Err(ForgeError::InvalidNetwork(format!(
                "mean image for '{}' has {} values, expected {} per channel or {} per image",
                name,
                logical.len(),
                channel_axis.map_or(0, |a| dims[a]),
                image_len
            )));
        };

        let dense = TensorDesc::new(Precision::FP32, dims.clone(), Layout::default_for_rank(rank));
        let gather = offset_map(&dense, &input.resolve());
        let values = (0..input.element_count())
            .map(|pos| lookup(gather.as_ref().map_or(pos, |m| m[pos])))
            .collect();
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Subtract in place from input data laid out like the edge.
    pub fn subtract(&self, data: &mut [f32]) {
        for (d, m) in data.iter_mut().zip(&self.values) {
            *d -= m;
        }
    }
}

/// Blob values in logical (dense default layout) order.
fn logical_values(blob: &Blob) -> Vec<f32> {
    let raw = blob.to_f32_vec();
    let stored = blob.desc().resolve();
    let dense = stored.clone().with_layout(Layout::default_for_rank(stored.rank()));
    match offset_map(&stored, &dense) {
        None => raw,
        Some(map) => map.into_iter().map(|src| raw[src]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(dims: Vec<usize>, layout: Layout, values: &[f32]) -> Blob {
        Blob::from_f32(&TensorDesc::new(Precision::FP32, dims, layout), values).unwrap()
    }

    #[test]
    fn test_whole_image_on_vector() {
        let input = TensorDesc::new(Precision::FP32, vec![3], Layout::C);
        let mean = MeanImage::new("x", &blob(vec![3], Layout::C, &[1.0, 1.0, 1.0]), &input).unwrap();
        let mut data = vec![1.0, 2.0, 3.0];
        mean.subtract(&mut data);
        assert_eq!(data, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_per_channel_repeats_over_batch_and_space() {
        let input = TensorDesc::new(Precision::FP32, vec![2, 2, 1, 2], Layout::NCHW);
        let mean = MeanImage::new("x", &blob(vec![2], Layout::C, &[1.0, 10.0]), &input).unwrap();
        let mut data = vec![0.0; 8];
        mean.subtract(&mut data);
        assert_eq!(data, vec![-1.0, -1.0, -10.0, -10.0, -1.0, -1.0, -10.0, -10.0]);
    }

    #[test]
    fn test_per_channel_follows_nhwc_memory() {
        let input = TensorDesc::new(Precision::FP32, vec![1, 2, 1, 2], Layout::NHWC);
        let mean = MeanImage::new("x", &blob(vec![2], Layout::C, &[1.0, 10.0]), &input).unwrap();
        let mut data = vec![0.0; 4];
        mean.subtract(&mut data);
        assert_eq!(data, vec![-1.0, -10.0, -1.0, -10.0]);
    }

    #[test]
    fn test_image_mean_is_read_in_logical_order() {
        // image [C=2, H=1, W=2] stored NCHW, input stored NHWC
        let input = TensorDesc::new(Precision::FP32, vec![1, 2, 1, 2], Layout::NHWC);
        let image = blob(vec![1, 2, 1, 2], Layout::NCHW, &[1.0, 2.0, 3.0, 4.0]);
        let mean = MeanImage::new("x", &image, &input).unwrap();
        let mut data = vec![0.0; 4];
        mean.subtract(&mut data);
        assert_eq!(data, vec![-1.0, -3.0, -2.0, -4.0]);
    }

    #[test]
    fn test_rejects_bad_shapes_and_precision() {
        let input = TensorDesc::new(Precision::FP32, vec![1, 3, 2, 2], Layout::NCHW);
        assert!(matches!(
            MeanImage::new("x", &blob(vec![5], Layout::C, &[0.0; 5]), &input),
            Err(ForgeError::InvalidNetwork(_))
        ));
        let u8_input = input.with_precision(Precision::U8);
        assert!(matches!(
            MeanImage::new("x", &blob(vec![3], Layout::C, &[0.0; 3]), &u8_input),
            Err(ForgeError::InvalidNetwork(_))
        ));
    }
}
