//! Region-of-interest max pooling.
//!
//! Port 0 is the feature map `[N, C, H, W]`, port 1 the ROI table
//! `[R, 5]` with rows `(batch, x1, y1, x2, y2)` in input-image coordinates.
//! The output is `[R, C, pooled_h, pooled_w]`. A row whose batch index is
//! `-1` terminates the table; it and every later row produce zeros.

use crate::error::{ForgeError, ForgeResult};
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    ensure_fp32_outputs, f32_input, f32_output, unsupported, ImplType, Kernel, KernelContext,
    OpContext, Operator, OperatorKind, PortConfig, PrimitiveDesc,
};
use crate::param_error;
use crate::tensor::{Layout, Precision, Storage};

const ROI_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiPoolingParams {
    pub pooled_h: usize,
    pub pooled_w: usize,
    pub spatial_scale: f32,
}

#[derive(Debug)]
pub struct RoiPoolingOp {
    params: RoiPoolingParams,
}

impl RoiPoolingOp {
    pub fn new(params: RoiPoolingParams) -> Self {
        Self { params }
    }

    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 2..=2, 1)?;
        let params = RoiPoolingParams {
            pooled_h: layer.param_required("pooled_h")?,
            pooled_w: layer.param_required("pooled_w")?,
            spatial_scale: layer.param_or("spatial_scale", 1.0f32)?,
        };
        if params.pooled_h == 0 || params.pooled_w == 0 {
            return Err(param_error!(layer.name, "pooled_h", "pooled size must be positive"));
        }
        if !(params.spatial_scale.is_finite() && params.spatial_scale > 0.0) {
            return Err(param_error!(
                layer.name,
                "spatial_scale",
                "must be positive, got {}",
                params.spatial_scale
            ));
        }
        Ok(Box::new(RoiPoolingOp::new(params)))
    }
}

impl Operator for RoiPoolingOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::ROIPooling
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        let (data, rois) = match ctx.inputs {
            [data, rois] => (data, rois),
            _ => return Err(unsupported(ctx.node, "expects data and rois inputs")),
        };
        if data.rank() != 4 {
            return Err(unsupported(
                ctx.node,
                format!("data must be 4D, got {:?}", data.dims),
            ));
        }
        if rois.rank() != 2 || rois.dims[1] != ROI_FIELDS {
            return Err(unsupported(
                ctx.node,
                format!("rois must be [R, {}], got {:?}", ROI_FIELDS, rois.dims),
            ));
        }
        let expected = [rois.dims[0], data.dims[1], self.params.pooled_h, self.params.pooled_w];
        if let Some(out) = ctx.outputs.first() {
            if !out.dims.is_empty() && out.dims != expected {
                return Err(unsupported(
                    ctx.node,
                    format!("output dims {:?}, expected {:?}", out.dims, expected),
                ));
            }
        }
        ensure_fp32_outputs(ctx)?;
        Ok(vec![PrimitiveDesc::new(
            ImplType::Reference,
            vec![
                PortConfig::new(Layout::NCHW, Precision::FP32),
                PortConfig::new(Layout::NC, Precision::FP32),
            ],
            vec![PortConfig::new(Layout::NCHW, Precision::FP32)],
        )])
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        let (data, rois) = match ctx.inputs {
            [data, rois] => (data, rois),
            _ => return Err(crate::internal_error!("roi pooling '{}' is not connected", ctx.node)),
        };
        Ok(Box::new(RoiPoolingKernel {
            node: ctx.node.to_string(),
            params: self.params,
            batch: data.dims[0],
            channels: data.dims[1],
            height: data.dims[2],
            width: data.dims[3],
            rois: rois.dims[0],
        }))
    }
}

#[derive(Debug)]
struct RoiPoolingKernel {
    node: String,
    params: RoiPoolingParams,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
    rois: usize,
}

impl RoiPoolingKernel {
    /// Number of leading ROI rows before the `-1` terminator.
    fn real_rois(&self, rois: &[f32]) -> usize {
        (0..self.rois)
            .find(|&n| rois[n * ROI_FIELDS] as i64 == -1)
            .unwrap_or(self.rois)
    }
}

impl Kernel for RoiPoolingKernel {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        let data = f32_input(&self.node, inputs[0])?;
        let rois = f32_input(&self.node, inputs[1])?;
        let dst = f32_output(&self.node, &mut outputs[0])?;

        let RoiPoolingParams {
            pooled_h,
            pooled_w,
            spatial_scale,
        } = self.params;
        let (c_total, h_total, w_total) = (self.channels, self.height as i64, self.width as i64);
        let (ph_total, pw_total) = (pooled_h as i64, pooled_w as i64);
        let plane = pooled_h * pooled_w;
        let scale = spatial_scale as f64;

        let real_rois = self.real_rois(rois);
        for n in 0..real_rois {
            let roi = &rois[n * ROI_FIELDS..(n + 1) * ROI_FIELDS];
            let batch = roi[0] as i64;
            if batch < 0 || batch as usize >= self.batch {
                return Err(ForgeError::InvalidParameter {
                    layer: self.node.clone(),
                    param: "rois".to_string(),
                    reason: format!("roi {} refers to batch {} of {}", n, batch, self.batch),
                });
            }
            let batch = batch as usize;
            let round = |v: f32| (v as f64 * scale).round() as i64;
            let (start_w, start_h) = (round(roi[1]), round(roi[2]));
            let (end_w, end_h) = (round(roi[3]), round(roi[4]));
            let roi_h = (end_h - start_h + 1).max(1);
            let roi_w = (end_w - start_w + 1).max(1);

            for c in 0..c_total {
                let src = &data[((batch * c_total) + c) * self.height * self.width..];
                let out = &mut dst[(n * c_total + c) * plane..][..plane];
                for ph in 0..ph_total {
                    let hstart = (ph * roi_h).div_euclid(ph_total);
                    let hend = ((ph + 1) * roi_h + ph_total - 1).div_euclid(ph_total);
                    let hstart = (hstart + start_h).clamp(0, h_total);
                    let hend = (hend + start_h).clamp(0, h_total);
                    for pw in 0..pw_total {
                        let wstart = (pw * roi_w).div_euclid(pw_total);
                        let wend = ((pw + 1) * roi_w + pw_total - 1).div_euclid(pw_total);
                        let wstart = (wstart + start_w).clamp(0, w_total);
                        let wend = (wend + start_w).clamp(0, w_total);

                        let slot = &mut out[(ph * pw_total + pw) as usize];
                        if hend <= hstart || wend <= wstart {
                            *slot = 0.0;
                            continue;
                        }
                        let mut max = -f32::MAX;
                        for h in hstart..hend {
                            let row = &src[(h * w_total) as usize..];
                            for &v in &row[wstart as usize..wend as usize] {
                                if v > max {
                                    max = v;
                                }
                            }
                        }
                        *slot = max;
                    }
                }
            }
        }

        dst[real_rois * c_total * plane..].fill(0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::tensor::{Data, TensorDesc};

    fn pool(params: RoiPoolingParams, data_dims: Vec<usize>, data: Vec<f32>, rois: Vec<f32>) -> ForgeResult<Vec<f32>> {
        let r = rois.len() / ROI_FIELDS;
        let c = data_dims[1];
        let ins = [
            TensorDesc::new(Precision::FP32, data_dims, Layout::NCHW),
            TensorDesc::new(Precision::FP32, vec![r, ROI_FIELDS], Layout::NC),
        ];
        let outs = [TensorDesc::new(
            Precision::FP32,
            vec![r, c, params.pooled_h, params.pooled_w],
            Layout::NCHW,
        )];
        let op = RoiPoolingOp::new(params);
        let pd = op.supported_primitives(&OpContext {
            node: "roi",
            inputs: &ins,
            outputs: &outs,
        })?;
        let config = GraphConfig::default();
        let kernel = op.create_kernel(
            &pd[0],
            &KernelContext {
                node: "roi",
                inputs: &ins,
                outputs: &outs,
                config: &config,
            },
        )?;
        let data = Storage::F32(data);
        let rois = Storage::F32(rois);
        let mut out = [Storage::F32(vec![f32::NAN; outs[0].element_count()])];
        kernel.execute(&[&data, &rois], &mut out)?;
        Ok(out[0].as_f32().unwrap().to_vec())
    }

    fn params(pooled: usize, spatial_scale: f32) -> RoiPoolingParams {
        RoiPoolingParams {
            pooled_h: pooled,
            pooled_w: pooled,
            spatial_scale,
        }
    }

    #[test]
    fn test_whole_map_two_by_two() {
        // 4x4 map holding 0..16, one roi covering all of it
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let out = pool(params(2, 1.0), vec![1, 1, 4, 4], data, vec![0.0, 0.0, 0.0, 3.0, 3.0]).unwrap();
        assert_eq!(out, vec![5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn test_spatial_scale_rounds_coordinates() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        // 0.5 * (2, 2, 6, 6) -> cells (1..=3, 1..=3)
        let out = pool(params(1, 0.5), vec![1, 1, 4, 4], data, vec![0.0, 2.0, 2.0, 6.0, 6.0]).unwrap();
        assert_eq!(out, vec![15.0]);
    }

    #[test]
    fn test_terminator_zeroes_trailing_rois() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let rois = vec![
            0.0, 0.0, 0.0, 1.0, 1.0, //
            -1.0, 0.0, 0.0, 1.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, 1.0,
        ];
        let out = pool(params(1, 1.0), vec![1, 1, 2, 2], data, rois).unwrap();
        assert_eq!(out, vec![4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_negative_values_keep_max() {
        let data = vec![-5.0, -3.0, -4.0, -9.0];
        let out = pool(params(1, 1.0), vec![1, 1, 2, 2], data, vec![0.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
        assert_eq!(out, vec![-3.0]);
    }

    #[test]
    fn test_roi_outside_map_is_empty() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let out = pool(params(1, 1.0), vec![1, 1, 2, 2], data, vec![0.0, 10.0, 10.0, 12.0, 12.0]).unwrap();
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn test_batch_index_out_of_range() {
        let data = vec![1.0; 4];
        assert!(pool(params(1, 1.0), vec![1, 1, 2, 2], data, vec![3.0, 0.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_from_layer_params() {
        let layer = Layer::new("roi", "ROIPooling")
            .with_input("data")
            .with_input("rois")
            .with_output(Data::new("y", Precision::FP32, Layout::Any))
            .with_param("pooled_h", 7)
            .with_param("pooled_w", 7)
            .with_param("spatial_scale", 0.0625);
        assert!(RoiPoolingOp::from_layer(&layer).is_ok());
        let bad = layer.clone().with_param("pooled_w", 0);
        assert!(RoiPoolingOp::from_layer(&bad).is_err());
        let missing = Layer::new("roi", "ROIPooling")
            .with_input("data")
            .with_input("rois")
            .with_output(Data::new("y", Precision::FP32, Layout::Any));
        assert!(matches!(
            RoiPoolingOp::from_layer(&missing),
            Err(ForgeError::InvalidParameter { .. })
        ));
    }
}
