use std::sync::Arc;

use crate::alignment::ForcedAligner;
use crate::audio::AudioPreprocessor;
use crate::config::{AssessmentConfig, Wav2Vec2Config};
use crate::embedding::{ReferenceEmbeddingCache, ReferenceEmbeddingProvider};
use crate::error::AssessmentError;
use crate::mistakes::MistakeDetector;
use crate::pipeline::assessment::AssessmentPipeline;
use crate::pipeline::context::ModelContext;
use crate::pipeline::defaults::default_alignment_strategy;
use crate::pipeline::traits::{AlignmentStrategy, TipProvider};
use crate::scoring::SimilarityScorer;
use crate::verification::SpeechVerifier;

pub struct AssessmentPipelineBuilder {
    config: AssessmentConfig,
    models: Option<ModelContext>,
    alignment_strategy: Option<Box<dyn AlignmentStrategy>>,
    tip_provider: Option<Arc<dyn TipProvider>>,
    reference_cache: Option<Arc<ReferenceEmbeddingCache>>,
}

impl AssessmentPipelineBuilder {
    pub fn new(config: AssessmentConfig) -> Self {
        Self {
            config,
            models: None,
            alignment_strategy: None,
            tip_provider: None,
            reference_cache: None,
        }
    }

    pub fn with_models(mut self, models: ModelContext) -> Self {
        self.models = Some(models);
        self
    }

    /// Lazily loads a wav2vec2 checkpoint on first assessment.
    pub fn with_wav2vec2(self, config: Wav2Vec2Config) -> Self {
        self.with_models(ModelContext::wav2vec2(config))
    }

    pub fn with_alignment_strategy(mut self, strategy: Box<dyn AlignmentStrategy>) -> Self {
        self.alignment_strategy = Some(strategy);
        self
    }

    pub fn with_tip_provider(mut self, provider: Arc<dyn TipProvider>) -> Self {
        self.tip_provider = Some(provider);
        self
    }

    /// Shares reference embeddings with other pipelines or a preloaded store.
    pub fn with_reference_cache(mut self, cache: Arc<ReferenceEmbeddingCache>) -> Self {
        self.reference_cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<AssessmentPipeline, AssessmentError> {
        validate(&self.config)?;

        let models = self.models.unwrap_or_else(|| {
            tracing::warn!("no acoustic models configured; assessments will report model_unavailable");
            ModelContext::unavailable("no acoustic models configured")
        });
        let cache = self.reference_cache.unwrap_or_default();

        Ok(AssessmentPipeline {
            preprocessor: AudioPreprocessor::new(self.config.preprocess.clone()),
            verifier: SpeechVerifier::new(self.config.verification.clone()),
            aligner: ForcedAligner::new(
                self.alignment_strategy
                    .unwrap_or_else(default_alignment_strategy),
            ),
            references: ReferenceEmbeddingProvider::new(cache),
            scorer: SimilarityScorer::new(self.config.scoring.weak_threshold),
            detector: MistakeDetector::new(),
            tip_provider: self.tip_provider,
            models: Arc::new(models),
            config: self.config,
        })
    }
}

fn validate(config: &AssessmentConfig) -> Result<(), AssessmentError> {
    let verification = &config.verification;
    if !(0.0..=1.0).contains(&verification.proceed_threshold)
        || !(0.0..=1.0).contains(&verification.match_threshold)
    {
        return Err(AssessmentError::invalid_input(
            "verification thresholds must lie in [0, 1]",
        ));
    }
    if verification.proceed_threshold > verification.match_threshold {
        return Err(AssessmentError::invalid_input(format!(
            "proceed threshold {} exceeds match threshold {}",
            verification.proceed_threshold, verification.match_threshold
        )));
    }
    if !(0.0..=1.0).contains(&config.scoring.weak_threshold) {
        return Err(AssessmentError::invalid_input(
            "weak phoneme threshold must lie in [0, 1]",
        ));
    }
    if config.preprocess.target_sample_rate_hz == 0 {
        return Err(AssessmentError::invalid_input(
            "target sample rate must be positive",
        ));
    }
    Ok(())
}
