use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, GroupNorm, LayerNorm, Linear, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;

enum ConvNorm {
    /// Normalizes channels at every time step (`feat_extract_norm = "layer"`).
    Layer(LayerNorm),
    /// One group per channel over time, first layer only (`feat_extract_norm = "group"`).
    Group(GroupNorm),
    None,
}

struct ConvBlock {
    conv: Conv1d,
    norm: ConvNorm,
}

impl ConvBlock {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        let xs = match &self.norm {
            ConvNorm::Layer(ln) => ln
                .forward(&xs.transpose(1, 2)?)?
                .transpose(1, 2)?
                .contiguous()?,
            ConvNorm::Group(gn) => gn.forward(&xs)?,
            ConvNorm::None => xs,
        };
        xs.gelu_erf()
    }
}

/// Strided convolution stack turning raw samples into frame features.
pub(crate) struct FeatureEncoder {
    blocks: Vec<ConvBlock>,
}

impl FeatureEncoder {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut blocks = Vec::with_capacity(cfg.conv_dim.len());
        let mut in_channels = 1;
        for (i, &out_channels) in cfg.conv_dim.iter().enumerate() {
            let layer_vb = vb.pp(format!("conv_layers.{i}"));
            let conv_cfg = Conv1dConfig {
                stride: cfg.conv_stride[i],
                ..Default::default()
            };
            let kernel = cfg.conv_kernel[i];
            let conv = if cfg.conv_bias {
                candle_nn::conv1d(in_channels, out_channels, kernel, conv_cfg, layer_vb.pp("conv"))?
            } else {
                candle_nn::conv1d_no_bias(
                    in_channels,
                    out_channels,
                    kernel,
                    conv_cfg,
                    layer_vb.pp("conv"),
                )?
            };
            let norm = match cfg.feat_extract_norm.as_str() {
                "layer" => ConvNorm::Layer(candle_nn::layer_norm(
                    out_channels,
                    cfg.layer_norm_eps,
                    layer_vb.pp("layer_norm"),
                )?),
                "group" if i == 0 => ConvNorm::Group(candle_nn::group_norm(
                    out_channels,
                    out_channels,
                    cfg.layer_norm_eps,
                    layer_vb.pp("layer_norm"),
                )?),
                _ => ConvNorm::None,
            };
            blocks.push(ConvBlock { conv, norm });
            in_channels = out_channels;
        }
        Ok(Self { blocks })
    }

    /// `(batch, samples)` in, `(batch, channels, frames)` out.
    pub(crate) fn forward(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = audio.unsqueeze(1)?;
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        Ok(h)
    }
}

/// Projects conv features up to the transformer width.
pub(crate) struct FeatureProjection {
    norm: LayerNorm,
    proj: Linear,
}

impl FeatureProjection {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let in_dim = cfg.conv_dim.last().copied().unwrap_or(cfg.hidden_size);
        Ok(Self {
            norm: candle_nn::layer_norm(in_dim, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            proj: candle_nn::linear(in_dim, cfg.hidden_size, vb.pp("projection"))?,
        })
    }

    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.proj.forward(&self.norm.forward(xs)?)
    }
}

/// Loads a conv whose weight may be stored weight-normalized (`weight_g`,
/// `weight_v`), as the positional convolution usually is.
pub(crate) fn weight_norm_conv1d(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    cfg: Conv1dConfig,
    vb: VarBuilder,
) -> candle_core::Result<Conv1d> {
    let per_group = in_channels / cfg.groups;
    let weight = match vb.get((out_channels, per_group, kernel), "weight_v") {
        Ok(v) => {
            // g is either per-kernel-position (dim=2) or per-output-channel (dim=0)
            match vb.get((1, 1, kernel), "weight_g") {
                Ok(g) => {
                    let norm = v.sqr()?.sum_keepdim(0)?.sum_keepdim(1)?.sqrt()?;
                    v.broadcast_div(&norm)?.broadcast_mul(&g)?
                }
                Err(_) => {
                    let g = vb.get((out_channels, 1, 1), "weight_g")?;
                    let norm = v
                        .reshape((out_channels, per_group * kernel))?
                        .sqr()?
                        .sum_keepdim(1)?
                        .sqrt()?
                        .unsqueeze(2)?;
                    v.broadcast_div(&norm)?.broadcast_mul(&g)?
                }
            }
        }
        Err(_) => vb.get((out_channels, per_group, kernel), "weight")?,
    };
    let bias = vb.get(out_channels, "bias")?;
    Ok(Conv1d::new(weight, Some(bias), cfg))
}
