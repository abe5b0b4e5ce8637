use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;
use crate::model::conv::{FeatureEncoder, FeatureProjection};
use crate::model::encoder::ContextEncoder;

pub(crate) struct Wav2Vec2ForCTC {
    feature_encoder: FeatureEncoder,
    projection: FeatureProjection,
    encoder: ContextEncoder,
    lm_head: Linear,
}

impl Wav2Vec2ForCTC {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let body = vb.pp("wav2vec2");
        Ok(Self {
            feature_encoder: FeatureEncoder::load(cfg, body.pp("feature_extractor"))?,
            projection: FeatureProjection::load(cfg, body.pp("feature_projection"))?,
            encoder: ContextEncoder::load(cfg, body.pp("encoder"))?,
            lm_head: candle_nn::linear(cfg.hidden_size, cfg.vocab_size, vb.pp("lm_head"))?,
        })
    }

    /// Contextual frame embeddings, `(batch, frames, hidden)`.
    pub(crate) fn hidden_states(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.feature_encoder.forward(audio)?;
        let projected = self
            .projection
            .forward(&features.transpose(1, 2)?.contiguous()?)?;
        self.encoder.forward(&projected)
    }

    /// CTC logits over the character vocabulary for precomputed hidden states.
    pub(crate) fn ctc_logits(&self, hidden: &Tensor) -> candle_core::Result<Tensor> {
        self.lm_head.forward(hidden)
    }
}
