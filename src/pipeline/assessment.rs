use std::sync::Arc;
use std::time::Instant;

use crate::alignment::ForcedAligner;
use crate::audio::AudioPreprocessor;
use crate::config::AssessmentConfig;
use crate::embedding::ReferenceEmbeddingProvider;
use crate::error::AssessmentError;
use crate::mistakes::MistakeDetector;
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::context::ModelContext;
use crate::pipeline::result::{
    AssessmentResult, CompletedAssessment, Rejection, SimulatedAssessment, VerificationSummary,
};
use crate::pipeline::state::{PipelineState, StageTrace};
use crate::pipeline::timeout::Timed;
use crate::pipeline::traits::{
    CharPosteriorModel, EmbeddingModel, TipProvider, Transcriber,
};
use crate::scoring::{ScoreSheet, SimilarityScorer};
use crate::types::{AlignmentResult, ExpectedSentence};
use crate::verification::SpeechVerifier;

/// Sequences preprocessing, verification, alignment, embedding, scoring and
/// mistake detection for one utterance at a time. Shareable across threads.
pub struct AssessmentPipeline {
    pub(crate) config: AssessmentConfig,
    pub(crate) models: Arc<ModelContext>,
    pub(crate) preprocessor: AudioPreprocessor,
    pub(crate) verifier: SpeechVerifier,
    pub(crate) aligner: ForcedAligner,
    pub(crate) references: ReferenceEmbeddingProvider,
    pub(crate) scorer: SimilarityScorer,
    pub(crate) detector: MistakeDetector,
    pub(crate) tip_provider: Option<Arc<dyn TipProvider>>,
}

/// Either a terminal result reached inside the happy path, or the pieces of a
/// completed assessment.
enum Outcome {
    Finished(AssessmentResult),
    Completed(Box<CompletedAssessment>),
}

impl AssessmentPipeline {
    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    pub fn references(&self) -> &ReferenceEmbeddingProvider {
        &self.references
    }

    pub fn assess(&self, audio: &[u8], sentence: &ExpectedSentence) -> AssessmentResult {
        self.assess_with_cancel(audio, sentence, &CancellationFlag::new())
    }

    /// Never returns a raw error: every failure becomes a `Rejected` result,
    /// or `Simulated` when simulated mode covers it.
    pub fn assess_with_cancel(
        &self,
        audio: &[u8],
        sentence: &ExpectedSentence,
        cancel: &CancellationFlag,
    ) -> AssessmentResult {
        let started = Instant::now();
        let mut trace = StageTrace::new();
        let result = match self.run(audio, sentence, cancel, &mut trace) {
            Ok(Outcome::Finished(result)) => result,
            Ok(Outcome::Completed(done)) => AssessmentResult::Completed(done),
            Err(err) => self.handle_failure(err, sentence, trace),
        };
        let result = with_elapsed(result, started);

        match &result {
            AssessmentResult::Completed(done) => tracing::info!(
                sentence_id = %sentence.id,
                overall = done.overall_score,
                weak = done.weak_phonemes.len(),
                mistakes = done.mistake_report.counts.total,
                elapsed_ms = done.processing_time_ms,
                "assessment completed"
            ),
            AssessmentResult::Rejected(rejection) => tracing::warn!(
                sentence_id = %sentence.id,
                error = rejection.error.as_str(),
                message = %rejection.message,
                "assessment rejected"
            ),
            AssessmentResult::Simulated(simulated) => tracing::warn!(
                sentence_id = %sentence.id,
                reason = simulated.reason.as_str(),
                "returning simulated assessment"
            ),
        }
        result
    }

    fn handle_failure(
        &self,
        err: AssessmentError,
        sentence: &ExpectedSentence,
        mut trace: StageTrace,
    ) -> AssessmentResult {
        let simulable = matches!(
            err,
            AssessmentError::ModelUnavailable { .. } | AssessmentError::NoReferenceAudio { .. }
        );
        if simulable && self.config.simulated_mode {
            trace.terminate(PipelineState::Simulated);
            return AssessmentResult::Simulated(SimulatedAssessment::new(
                &sentence.id,
                sentence.phonemes.len(),
                &err,
                trace,
            ));
        }
        trace.terminate(PipelineState::Failed);
        AssessmentResult::Rejected(Rejection::from_error(&err, trace))
    }

    fn run(
        &self,
        audio: &[u8],
        sentence: &ExpectedSentence,
        cancel: &CancellationFlag,
        trace: &mut StageTrace,
    ) -> Result<Outcome, AssessmentError> {
        let timeouts = &self.config.timeouts;

        let audio = self.preprocessor.preprocess(audio)?;
        trace.advance(PipelineState::Cleaned)?;
        tracing::debug!(
            duration_secs = audio.duration_secs(),
            sample_rate_hz = audio.sample_rate_hz,
            "audio cleaned"
        );

        cancel.check("verification")?;
        let models = self.models.handles()?;
        let transcriber: Timed<dyn Transcriber> =
            Timed::new(Arc::clone(&models.transcriber), timeouts.transcription());
        let verification = self.verifier.verify(&transcriber, &audio, &sentence.text)?;
        trace.advance(PipelineState::Verified)?;
        if !verification.can_proceed {
            trace.advance(PipelineState::RejectedMismatch)?;
            return Ok(Outcome::Finished(AssessmentResult::Rejected(
                Rejection::content_mismatch(&verification, trace.clone()),
            )));
        }

        cancel.check("alignment")?;
        let posteriors: Timed<dyn CharPosteriorModel> =
            Timed::new(Arc::clone(&models.posteriors), timeouts.alignment());
        let phoneme_words = sentence.phoneme_words();
        let alignment = self.aligner.align(
            &posteriors,
            &audio,
            &sentence.phonemes,
            Some(&sentence.text),
            phoneme_words.as_deref(),
            0.0,
        )?;
        trace.advance(PipelineState::Aligned)?;

        // references first: a sentence without them must not cost a user embedding
        cancel.check("reference embeddings")?;
        let embedder: Timed<dyn EmbeddingModel> =
            Timed::new(Arc::clone(&models.embedder), timeouts.embedding());
        let reference = self
            .references
            .resolve(sentence, &embedder, &self.preprocessor, cancel)?;

        cancel.check("embedding")?;
        let matrix = embedder.embed(&audio)?;
        let windows: Vec<(f64, f64)> = alignment
            .phonemes
            .iter()
            .map(|p| (p.start, p.end))
            .collect();
        let user_vectors = matrix.pool_windows(&windows)?;
        trace.advance(PipelineState::Embedded)?;
        tracing::debug!(
            frames = matrix.num_frames(),
            dim = matrix.dim(),
            windows = windows.len(),
            "utterance embedded"
        );

        cancel.check("scoring")?;
        let scored = self.scorer.score(
            &user_vectors,
            &reference,
            &sentence.phonemes,
            Some(&alignment.phonemes),
        );
        trace.advance(PipelineState::Scored)?;
        let sheet = match scored {
            Ok(sheet) => sheet,
            Err(unscorable) => {
                trace.advance(PipelineState::RejectedUnscorable)?;
                return Ok(Outcome::Finished(AssessmentResult::Rejected(
                    Rejection::unscorable(unscorable, &verification, trace.clone()),
                )));
            }
        };

        cancel.check("mistake detection")?;
        let tips = self
            .tip_provider
            .as_ref()
            .map(|provider| Timed::new(Arc::clone(provider), timeouts.tips()));
        let report = self.detector.detect(
            &verification,
            Some(&sheet),
            &sentence.text,
            tips.as_ref().map(|t| t as &dyn TipProvider),
        );
        trace.advance(PipelineState::MistakesDetected)?;

        let overall = sheet.overall() as f64;
        let fluency = fluency_score(&alignment, sentence, overall);
        let clarity = clarity_score(&sheet, overall);
        trace.advance(PipelineState::Completed)?;

        Ok(Outcome::Completed(Box::new(CompletedAssessment {
            success: true,
            sentence_id: sentence.id.clone(),
            overall_score: round2(overall),
            fluency_score: round2(fluency),
            clarity_score: round2(clarity),
            score_resolution: sheet.resolution(),
            phoneme_scores: sheet.phoneme_scores().to_vec(),
            weak_phonemes: sheet.weak_phonemes(),
            stats: sheet.stats(),
            mistake_report: report,
            verification: VerificationSummary::from(&verification),
            stages: trace.clone(),
            processing_time_ms: 0,
        })))
    }
}

fn with_elapsed(result: AssessmentResult, started: Instant) -> AssessmentResult {
    let ms = started.elapsed().as_millis() as u64;
    match result {
        AssessmentResult::Completed(mut done) => {
            done.processing_time_ms = ms;
            AssessmentResult::Completed(done)
        }
        AssessmentResult::Rejected(rejection) => {
            AssessmentResult::Rejected(rejection.with_processing_time(ms))
        }
        AssessmentResult::Simulated(mut simulated) => {
            simulated.processing_time_ms = ms;
            AssessmentResult::Simulated(simulated)
        }
    }
}

/// Speaking-rate agreement with the reference recording. Spoken duration is
/// the end of the last aligned phoneme.
pub(crate) fn fluency_score(
    alignment: &AlignmentResult,
    sentence: &ExpectedSentence,
    overall: f64,
) -> f64 {
    let spoken = alignment.phonemes.last().map_or(0.0, |p| p.end);
    match sentence.reference_duration_secs() {
        Some(reference) if spoken > 0.0 => {
            let ratio = spoken / reference;
            if !(0.5..=2.0).contains(&ratio) {
                0.5
            } else {
                (1.0 - (1.0 - ratio).abs()).max(0.0)
            }
        }
        _ => overall * 0.95,
    }
}

/// Share of phonemes that are not weak; the overall score when there is no
/// per-phoneme breakdown.
pub(crate) fn clarity_score(sheet: &ScoreSheet, overall: f64) -> f64 {
    match sheet {
        ScoreSheet::PerPhoneme { scores } if !scores.is_empty() => {
            let weak = scores.iter().filter(|s| s.is_weak).count();
            1.0 - weak as f64 / scores.len() as f64
        }
        _ => overall,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::PhonemeScore;
    use crate::types::{PhonemePosition, PhonemeTimestamp, ReferenceTimestamp};

    fn alignment_ending_at(end: f64) -> AlignmentResult {
        AlignmentResult {
            phonemes: vec![PhonemeTimestamp {
                phoneme: "AH".to_string(),
                start: 0.0,
                end,
                word: None,
                position: PhonemePosition::Initial,
            }],
            speech_start: 0.0,
            speech_end: end,
        }
    }

    fn sentence_with_reference_end(end: Option<f64>) -> ExpectedSentence {
        ExpectedSentence {
            id: "s".to_string(),
            text: "a".to_string(),
            phonemes: vec!["AH".to_string()],
            reference_timestamps: end
                .map(|end| {
                    vec![ReferenceTimestamp {
                        phoneme: "AH".to_string(),
                        start: 0.0,
                        end,
                        word: None,
                    }]
                })
                .unwrap_or_default(),
            reference_audio: None,
            reference_embeddings: None,
        }
    }

    #[test]
    fn fluency_from_duration_ratio() {
        let sentence = sentence_with_reference_end(Some(1.0));
        assert!((fluency_score(&alignment_ending_at(1.0), &sentence, 0.8) - 1.0).abs() < 1e-9);
        assert!((fluency_score(&alignment_ending_at(1.25), &sentence, 0.8) - 0.75).abs() < 1e-9);
        assert!((fluency_score(&alignment_ending_at(0.8), &sentence, 0.8) - 0.8).abs() < 1e-9);
        // far too slow or too fast
        assert_eq!(fluency_score(&alignment_ending_at(2.5), &sentence, 0.8), 0.5);
        assert_eq!(fluency_score(&alignment_ending_at(0.3), &sentence, 0.8), 0.5);
    }

    #[test]
    fn fluency_without_reference_timing() {
        let sentence = sentence_with_reference_end(None);
        let fluency = fluency_score(&alignment_ending_at(1.0), &sentence, 0.8);
        assert!((fluency - 0.76).abs() < 1e-9);
    }

    #[test]
    fn clarity_is_share_of_strong_phonemes() {
        let score = |weak| PhonemeScore {
            phoneme: "AH".to_string(),
            score: if weak { 0.5 } else { 0.9 },
            is_weak: weak,
            start: None,
            end: None,
            word: None,
            position: None,
        };
        let sheet = ScoreSheet::PerPhoneme {
            scores: vec![score(true), score(false), score(false), score(false)],
        };
        assert!((clarity_score(&sheet, 0.8) - 0.75).abs() < 1e-9);

        let coarse = ScoreSheet::Sentence {
            similarity: 0.6,
            phoneme_count: 4,
        };
        assert!((clarity_score(&coarse, 0.6) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn rounding_to_two_decimals() {
        assert_eq!(round2(0.7349), 0.73);
        assert_eq!(round2(0.735), 0.74);
    }
}
