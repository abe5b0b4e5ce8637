mod similarity;
mod stats;

use serde::Serialize;

use crate::embedding::ReferenceEmbeddings;
use crate::types::{PhonemePosition, PhonemeTimestamp};
use crate::verification::round3;

pub use similarity::{cosine_similarity, has_nan, is_all_zero, mean_vector};
pub use stats::PhonemeStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhonemeScore {
    pub phoneme: String,
    /// Similarity in `[0, 1]`, rounded to 3 decimals.
    pub score: f32,
    pub is_weak: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PhonemePosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ScoreSheet {
    PerPhoneme { scores: Vec<PhonemeScore> },
    /// Only a sentence-level reference exists: one coarse similarity for the
    /// whole utterance, no per-phoneme breakdown.
    Sentence { similarity: f32, phoneme_count: usize },
}

impl ScoreSheet {
    pub fn phoneme_scores(&self) -> &[PhonemeScore] {
        match self {
            Self::PerPhoneme { scores } => scores,
            Self::Sentence { .. } => &[],
        }
    }

    pub fn resolution(&self) -> &'static str {
        match self {
            Self::PerPhoneme { .. } => "phoneme",
            Self::Sentence { .. } => "sentence",
        }
    }

    /// Mean phoneme score, or the sentence similarity.
    pub fn overall(&self) -> f32 {
        match self {
            Self::PerPhoneme { scores } if !scores.is_empty() => {
                scores.iter().map(|s| s.score as f64).sum::<f64>() as f32 / scores.len() as f32
            }
            Self::PerPhoneme { .. } => 0.0,
            Self::Sentence { similarity, .. } => *similarity,
        }
    }

    pub fn weak_phonemes(&self) -> Vec<String> {
        self.phoneme_scores()
            .iter()
            .filter(|s| s.is_weak)
            .map(|s| s.phoneme.clone())
            .collect()
    }

    pub fn stats(&self) -> Option<PhonemeStats> {
        PhonemeStats::from_scores(self.phoneme_scores())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscorableReason {
    EmbeddingCountMismatch,
    NanEmbeddings,
    EmbeddingQualityPoor,
    AllScoresZero,
}

impl UnscorableReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::EmbeddingCountMismatch => "embedding_count_mismatch",
            Self::NanEmbeddings => "nan_embeddings",
            Self::EmbeddingQualityPoor => "embedding_quality_poor",
            Self::AllScoresZero => "all_scores_zero",
        }
    }
}

/// Honest refusal to score: the embeddings cannot support a verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnscorableResult {
    pub reason: UnscorableReason,
    pub message: String,
    pub suggestion: String,
}

impl UnscorableResult {
    fn new(reason: UnscorableReason, message: impl Into<String>) -> Self {
        let suggestion = match reason {
            UnscorableReason::EmbeddingCountMismatch | UnscorableReason::NanEmbeddings => {
                "Please try recording again."
            }
            UnscorableReason::EmbeddingQualityPoor | UnscorableReason::AllScoresZero => {
                "Speak clearly and closer to the microphone, in a quiet room, then try again."
            }
        };
        Self {
            reason,
            message: message.into(),
            suggestion: suggestion.to_string(),
        }
    }
}

/// Compares user vectors against reference vectors and validates the outcome.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer {
    weak_threshold: f32,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            weak_threshold: 0.7,
        }
    }
}

impl SimilarityScorer {
    pub fn new(weak_threshold: f32) -> Self {
        Self { weak_threshold }
    }

    pub fn weak_threshold(&self) -> f32 {
        self.weak_threshold
    }

    pub fn score(
        &self,
        user: &[Vec<f32>],
        reference: &ReferenceEmbeddings,
        phonemes: &[String],
        timestamps: Option<&[PhonemeTimestamp]>,
    ) -> Result<ScoreSheet, UnscorableResult> {
        match reference {
            ReferenceEmbeddings::PerPhoneme(refs) => {
                self.score_per_phoneme(user, refs, phonemes, timestamps)
            }
            ReferenceEmbeddings::Sentence(reference) => {
                self.score_sentence(user, reference, phonemes.len())
            }
        }
    }

    pub fn score_per_phoneme(
        &self,
        user: &[Vec<f32>],
        reference: &[Vec<f32>],
        phonemes: &[String],
        timestamps: Option<&[PhonemeTimestamp]>,
    ) -> Result<ScoreSheet, UnscorableResult> {
        if user.len() != reference.len() || user.len() != phonemes.len() {
            return Err(UnscorableResult::new(
                UnscorableReason::EmbeddingCountMismatch,
                format!(
                    "{} user vectors, {} reference vectors, {} phonemes",
                    user.len(),
                    reference.len(),
                    phonemes.len()
                ),
            ));
        }
        validate_user_vectors(user)?;

        let scores: Vec<PhonemeScore> = phonemes
            .iter()
            .enumerate()
            .map(|(i, phoneme)| {
                let raw = cosine_similarity(&user[i], &reference[i]);
                let ts = timestamps.and_then(|t| t.get(i));
                PhonemeScore {
                    phoneme: phoneme.clone(),
                    score: round3(raw as f64) as f32,
                    // on the unrounded similarity; 0.6996 still reports as 0.7
                    is_weak: raw < self.weak_threshold,
                    start: ts.map(|t| t.start),
                    end: ts.map(|t| t.end),
                    word: ts.and_then(|t| t.word.clone()),
                    position: ts.map(|t| t.position),
                }
            })
            .collect();

        if !scores.is_empty() && scores.iter().all(|s| s.score == 0.0) {
            return Err(UnscorableResult::new(
                UnscorableReason::AllScoresZero,
                "every phoneme compared at zero similarity",
            ));
        }
        Ok(ScoreSheet::PerPhoneme { scores })
    }

    /// Coarse comparison of the mean user vector against a single reference.
    pub fn score_sentence(
        &self,
        user: &[Vec<f32>],
        reference: &[f32],
        phoneme_count: usize,
    ) -> Result<ScoreSheet, UnscorableResult> {
        validate_user_vectors(user)?;
        let Some(mean) = mean_vector(user) else {
            return Err(UnscorableResult::new(
                UnscorableReason::EmbeddingCountMismatch,
                "no user vectors to compare",
            ));
        };
        let similarity = round3(cosine_similarity(&mean, reference) as f64) as f32;
        if similarity == 0.0 {
            return Err(UnscorableResult::new(
                UnscorableReason::AllScoresZero,
                "sentence-level comparison produced zero similarity",
            ));
        }
        tracing::debug!(similarity, "sentence-level score");
        Ok(ScoreSheet::Sentence {
            similarity,
            phoneme_count,
        })
    }
}

fn validate_user_vectors(user: &[Vec<f32>]) -> Result<(), UnscorableResult> {
    let zero = user.iter().filter(|v| is_all_zero(v)).count();
    if zero * 2 > user.len() {
        return Err(UnscorableResult::new(
            UnscorableReason::EmbeddingQualityPoor,
            format!("{zero} of {} embeddings are empty", user.len()),
        ));
    }
    if user.iter().any(|v| has_nan(v)) {
        return Err(UnscorableResult::new(
            UnscorableReason::NanEmbeddings,
            "embedding model produced NaN values",
        ));
    }
    Ok(())
}
