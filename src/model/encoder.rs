use candle_core::{Module, Tensor, D};
use candle_nn::{Conv1d, Conv1dConfig, LayerNorm, Linear, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;
use crate::model::conv::weight_norm_conv1d;

/// Convolutional relative position embedding added before the first layer.
struct PositionalConv {
    conv: Conv1d,
}

impl PositionalConv {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv1dConfig {
            padding: cfg.num_conv_pos_embeddings / 2,
            groups: cfg.num_conv_pos_embedding_groups,
            ..Default::default()
        };
        let conv = weight_norm_conv1d(
            cfg.hidden_size,
            cfg.hidden_size,
            cfg.num_conv_pos_embeddings,
            conv_cfg,
            vb.pp("conv"),
        )?;
        Ok(Self { conv })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let frames = xs.dim(1)?;
        // even kernels produce one extra frame
        self.conv
            .forward(&xs.transpose(1, 2)?.contiguous()?)?
            .narrow(2, 0, frames)?
            .gelu_erf()?
            .transpose(1, 2)?
            .contiguous()
    }
}

struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    heads: usize,
    head_dim: usize,
}

impl Attention {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            q_proj: candle_nn::linear(h, h, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(h, h, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(h, h, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(h, h, vb.pp("out_proj"))?,
            heads: cfg.num_attention_heads,
            head_dim: h / cfg.num_attention_heads,
        })
    }

    fn split_heads(&self, xs: Tensor, batch: usize, frames: usize) -> candle_core::Result<Tensor> {
        xs.reshape((batch, frames, self.heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, frames, width) = xs.dims3()?;
        let scale = (self.head_dim as f64).powf(-0.5);
        let q = self.split_heads((self.q_proj.forward(xs)? * scale)?, batch, frames)?;
        let k = self.split_heads(self.k_proj.forward(xs)?, batch, frames)?;
        let v = self.split_heads(self.v_proj.forward(xs)?, batch, frames)?;

        let weights = candle_nn::ops::softmax(&q.matmul(&k.t()?.contiguous()?)?, D::Minus1)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, frames, width))?;
        self.out_proj.forward(&context)
    }
}

struct FeedForward {
    intermediate: Linear,
    output: Linear,
}

impl FeedForward {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            intermediate: candle_nn::linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate_dense"),
            )?,
            output: candle_nn::linear(
                cfg.intermediate_size,
                cfg.hidden_size,
                vb.pp("output_dense"),
            )?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.output
            .forward(&self.intermediate.forward(xs)?.gelu_erf()?)
    }
}

struct TransformerLayer {
    attention: Attention,
    attention_norm: LayerNorm,
    feed_forward: FeedForward,
    final_norm: LayerNorm,
    pre_norm: bool,
}

impl TransformerLayer {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let eps = cfg.layer_norm_eps;
        Ok(Self {
            attention: Attention::load(cfg, vb.pp("attention"))?,
            attention_norm: candle_nn::layer_norm(cfg.hidden_size, eps, vb.pp("layer_norm"))?,
            feed_forward: FeedForward::load(cfg, vb.pp("feed_forward"))?,
            final_norm: candle_nn::layer_norm(cfg.hidden_size, eps, vb.pp("final_layer_norm"))?,
            pre_norm: cfg.do_stable_layer_norm,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        if self.pre_norm {
            let h = (xs + self.attention.forward(&self.attention_norm.forward(xs)?)?)?;
            &h + self.feed_forward.forward(&self.final_norm.forward(&h)?)?
        } else {
            let h = self
                .attention_norm
                .forward(&(xs + self.attention.forward(xs)?)?)?;
            self.final_norm
                .forward(&(&h + self.feed_forward.forward(&h)?)?)
        }
    }
}

/// Transformer context network. Its output is the contextual embedding of
/// every frame.
pub(crate) struct ContextEncoder {
    pos_conv: PositionalConv,
    norm: LayerNorm,
    layers: Vec<TransformerLayer>,
    pre_norm: bool,
}

impl ContextEncoder {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let layers = (0..cfg.num_hidden_layers)
            .map(|i| TransformerLayer::load(cfg, vb.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            pos_conv: PositionalConv::load(cfg, vb.pp("pos_conv_embed"))?,
            norm: candle_nn::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            layers,
            pre_norm: cfg.do_stable_layer_norm,
        })
    }

    /// `(batch, frames, hidden)` in and out.
    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = (xs + self.pos_conv.forward(xs)?)?;
        if self.pre_norm {
            for layer in &self.layers {
                h = layer.forward(&h)?;
            }
            self.norm.forward(&h)
        } else {
            h = self.norm.forward(&h)?;
            for layer in &self.layers {
                h = layer.forward(&h)?;
            }
            Ok(h)
        }
    }
}
