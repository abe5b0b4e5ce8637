use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AssessmentError;

#[derive(Debug, Clone)]
pub struct Wav2Vec2Config {
    pub model_path: String,
    pub config_path: String,
    pub vocab_path: String,
    pub device: String,
    pub expected_sample_rate_hz: u32,
}

impl Wav2Vec2Config {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

    /// Conventional HuggingFace layout: `model.safetensors`, `config.json`, `vocab.json`.
    pub fn from_model_dir(model_dir: &Path, device: impl Into<String>) -> Self {
        Self {
            model_path: model_dir
                .join("model.safetensors")
                .to_string_lossy()
                .into_owned(),
            config_path: model_dir.join("config.json").to_string_lossy().into_owned(),
            vocab_path: model_dir.join("vocab.json").to_string_lossy().into_owned(),
            device: device.into(),
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}

impl Default for Wav2Vec2Config {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            config_path: String::new(),
            vocab_path: String::new(),
            device: "cpu".to_string(),
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct Wav2Vec2ModelConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub conv_dim: Vec<usize>,
    pub conv_kernel: Vec<usize>,
    pub conv_stride: Vec<usize>,
    pub num_conv_pos_embeddings: usize,
    pub num_conv_pos_embedding_groups: usize,
    #[serde(default)]
    pub do_stable_layer_norm: bool,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
    pub pad_token_id: usize,
    pub vocab_size: usize,
    #[serde(default = "default_feat_norm")]
    pub feat_extract_norm: String,
    #[serde(default = "default_conv_bias")]
    pub conv_bias: bool,
}

fn default_eps() -> f64 {
    1e-5
}
fn default_feat_norm() -> String {
    "layer".to_string()
}
fn default_conv_bias() -> bool {
    true
}

impl Wav2Vec2ModelConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, AssessmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AssessmentError::io("read config.json", e))?;
        serde_json::from_str(&data).map_err(|e| AssessmentError::json("parse config.json", e))
    }

    pub(crate) fn frame_stride_ms(&self, sample_rate: u32) -> f64 {
        let stride_samples: usize = self.conv_stride.iter().product();
        stride_samples as f64 / sample_rate as f64 * 1000.0
    }
}

/// Tunables for every pipeline stage. Missing JSON fields take the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub preprocess: PreprocessConfig,
    pub verification: VerificationConfig,
    pub scoring: ScoringConfig,
    pub timeouts: StageTimeouts,
    /// Return a labeled simulated result instead of a rejection when models cannot load.
    pub simulated_mode: bool,
}

impl AssessmentConfig {
    pub fn load(path: &Path) -> Result<Self, AssessmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AssessmentError::io("read assessment config", e))?;
        serde_json::from_str(&data)
            .map_err(|e| AssessmentError::json("parse assessment config", e))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub target_sample_rate_hz: u32,
    /// Frames quieter than this many dB below the peak frame are trimmed from both ends.
    pub trim_db: f32,
    /// Peak amplitude after normalization, as a fraction of full scale.
    pub headroom: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_sample_rate_hz: Wav2Vec2Config::DEFAULT_SAMPLE_RATE_HZ,
            trim_db: 20.0,
            headroom: 0.95,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub proceed_threshold: f64,
    pub match_threshold: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            proceed_threshold: 0.6,
            match_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weak_threshold: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weak_threshold: 0.7,
        }
    }
}

/// Per-stage inference bounds in milliseconds; `0` disables the bound.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub transcription_ms: u64,
    pub alignment_ms: u64,
    pub embedding_ms: u64,
    pub tips_ms: u64,
}

impl StageTimeouts {
    pub fn transcription(&self) -> Option<Duration> {
        non_zero_ms(self.transcription_ms)
    }

    pub fn alignment(&self) -> Option<Duration> {
        non_zero_ms(self.alignment_ms)
    }

    pub fn embedding(&self) -> Option<Duration> {
        non_zero_ms(self.embedding_ms)
    }

    pub fn tips(&self) -> Option<Duration> {
        non_zero_ms(self.tips_ms)
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            transcription_ms: 30_000,
            alignment_ms: 30_000,
            embedding_ms: 30_000,
            tips_ms: 10_000,
        }
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
