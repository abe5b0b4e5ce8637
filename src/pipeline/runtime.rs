use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use parking_lot::Mutex;

use crate::alignment::segments::greedy_transcript;
use crate::config::{Wav2Vec2Config, Wav2Vec2ModelConfig};
use crate::embedding::EmbeddingMatrix;
use crate::error::AssessmentError;
use crate::model::Wav2Vec2ForCTC;
use crate::pipeline::traits::{CharPosteriorModel, EmbeddingModel, Transcriber};
use crate::types::{CanonicalAudio, CtcPosteriors};

/// Everything one forward pass yields for an utterance.
#[derive(Clone)]
struct ForwardPass {
    fingerprint: u64,
    hidden: Tensor,
    log_probs: Vec<Vec<f32>>,
}

/// Candle wav2vec2 CTC checkpoint backing transcription, character posteriors
/// and contextual embeddings. The last forward pass is memoized, so the three
/// capabilities run the network once per utterance.
pub struct Wav2Vec2Runtime {
    model: Wav2Vec2ForCTC,
    device: Device,
    vocab: HashMap<char, usize>,
    blank_id: usize,
    word_sep_id: usize,
    stride_secs: f64,
    expected_sample_rate_hz: u32,
    last_pass: Mutex<Option<ForwardPass>>,
}

impl Wav2Vec2Runtime {
    pub fn load(config: &Wav2Vec2Config) -> Result<Self, AssessmentError> {
        let model_cfg = Wav2Vec2ModelConfig::load(Path::new(&config.config_path))?;
        let expected_sample_rate_hz = if config.expected_sample_rate_hz == 0 {
            Wav2Vec2Config::DEFAULT_SAMPLE_RATE_HZ
        } else {
            config.expected_sample_rate_hz
        };
        let vocab = load_vocab(Path::new(&config.vocab_path))?;
        let word_sep_id = vocab.get(&'|').copied().unwrap_or(model_cfg.pad_token_id);

        let device = select_device(&config.device)?;
        let weights = std::fs::read(&config.model_path)
            .map_err(|e| AssessmentError::io("read safetensors", e))?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &device)
            .map_err(|e| AssessmentError::runtime("load safetensors", e))?;
        let model = Wav2Vec2ForCTC::load(&model_cfg, vb)
            .map_err(|e| AssessmentError::runtime("build model", e))?;

        tracing::info!(
            hidden_size = model_cfg.hidden_size,
            layers = model_cfg.num_hidden_layers,
            vocab = model_cfg.vocab_size,
            ?device,
            "wav2vec2 runtime loaded"
        );

        Ok(Self {
            model,
            device,
            vocab,
            blank_id: model_cfg.pad_token_id,
            word_sep_id,
            stride_secs: model_cfg.frame_stride_ms(expected_sample_rate_hz) / 1000.0,
            expected_sample_rate_hz,
            last_pass: Mutex::new(None),
        })
    }

    pub fn stride_secs(&self) -> f64 {
        self.stride_secs
    }

    fn forward(&self, audio: &CanonicalAudio) -> Result<ForwardPass, AssessmentError> {
        if audio.samples.is_empty() {
            return Err(AssessmentError::invalid_audio("no samples to run the model on"));
        }
        if audio.sample_rate_hz != self.expected_sample_rate_hz {
            tracing::warn!(
                expected_rate_hz = self.expected_sample_rate_hz,
                actual_rate_hz = audio.sample_rate_hz,
                "wav2vec2 expects a specific sample rate; quality may degrade"
            );
        }

        let fingerprint = fingerprint(audio);
        if let Some(pass) = self
            .last_pass
            .lock()
            .as_ref()
            .filter(|pass| pass.fingerprint == fingerprint)
        {
            return Ok(pass.clone());
        }

        let normalized = normalize_audio(&audio.samples);
        let input = Tensor::from_vec(normalized, (1, audio.samples.len()), &self.device)
            .map_err(|e| AssessmentError::runtime("tensor creation", e))?;
        let hidden = self
            .model
            .hidden_states(&input)
            .and_then(|h| h.squeeze(0))
            .map_err(|e| AssessmentError::runtime("forward pass", e))?;
        let log_probs = self
            .model
            .ctc_logits(&hidden)
            .and_then(|logits| candle_nn::ops::log_softmax(&logits, D::Minus1))
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(|e| AssessmentError::runtime("log_softmax", e))?;

        tracing::debug!(frames = log_probs.len(), "wav2vec2 forward pass");
        let pass = ForwardPass {
            fingerprint,
            hidden,
            log_probs,
        };
        *self.last_pass.lock() = Some(pass.clone());
        Ok(pass)
    }

    fn posteriors_from(&self, log_probs: Vec<Vec<f32>>) -> CtcPosteriors {
        CtcPosteriors {
            log_probs,
            stride_secs: self.stride_secs,
            vocab: self.vocab.clone(),
            blank_id: self.blank_id,
            word_sep_id: self.word_sep_id,
        }
    }
}

impl Transcriber for Wav2Vec2Runtime {
    fn transcribe(&self, audio: &CanonicalAudio) -> Result<String, AssessmentError> {
        let pass = self.forward(audio)?;
        Ok(greedy_transcript(&self.posteriors_from(pass.log_probs)))
    }
}

impl CharPosteriorModel for Wav2Vec2Runtime {
    fn char_posteriors(&self, audio: &CanonicalAudio) -> Result<CtcPosteriors, AssessmentError> {
        let pass = self.forward(audio)?;
        Ok(self.posteriors_from(pass.log_probs))
    }
}

impl EmbeddingModel for Wav2Vec2Runtime {
    fn embed(&self, audio: &CanonicalAudio) -> Result<EmbeddingMatrix, AssessmentError> {
        let pass = self.forward(audio)?;
        let hidden = pass
            .hidden
            .to_device(&Device::Cpu)
            .map_err(|e| AssessmentError::runtime("copy embeddings to host", e))?;
        EmbeddingMatrix::new(hidden, self.stride_secs)
    }
}

fn select_device(device: &str) -> Result<Device, AssessmentError> {
    match device {
        "cuda" => Device::new_cuda(0).map_err(|e| AssessmentError::runtime("CUDA init", e)),
        "metal" => Device::new_metal(0).map_err(|e| AssessmentError::runtime("Metal init", e)),
        _ => Ok(Device::Cpu),
    }
}

pub(crate) fn load_vocab(path: &Path) -> Result<HashMap<char, usize>, AssessmentError> {
    let data =
        std::fs::read_to_string(path).map_err(|e| AssessmentError::io("read vocab.json", e))?;
    let raw: HashMap<String, usize> =
        serde_json::from_str(&data).map_err(|e| AssessmentError::json("parse vocab.json", e))?;

    // multi-character entries (<pad>, <s>, ...) never appear in transcripts
    Ok(raw
        .into_iter()
        .filter_map(|(token, id)| {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some((c, id)),
                _ => None,
            }
        })
        .collect())
}

/// Zero mean, unit variance, as wav2vec2 feature extractors expect.
fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| (x as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std = var.sqrt().max(1e-7);
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}

fn fingerprint(audio: &CanonicalAudio) -> u64 {
    let mut hasher = DefaultHasher::new();
    audio.sample_rate_hz.hash(&mut hasher);
    audio.samples.len().hash(&mut hasher);
    for s in &audio.samples {
        s.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
