use std::collections::HashMap;

use crate::embedding::EmbeddingMatrix;
use crate::error::AssessmentError;
use crate::types::{AlignmentResult, CanonicalAudio, CtcPosteriors, TokenSequence, WordSpan};

/// Speech-to-text capability used by the verifier.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &CanonicalAudio) -> Result<String, AssessmentError>;
}

/// Frame-level character posteriors used by the aligner.
pub trait CharPosteriorModel: Send + Sync {
    fn char_posteriors(&self, audio: &CanonicalAudio) -> Result<CtcPosteriors, AssessmentError>;
}

/// Contextual acoustic embeddings over a whole utterance.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, audio: &CanonicalAudio) -> Result<EmbeddingMatrix, AssessmentError>;
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(
        &self,
        transcript: &str,
        vocab: &HashMap<char, usize>,
        blank_id: usize,
        word_sep_id: usize,
    ) -> TokenSequence;
}

pub trait SequenceAligner: Send + Sync {
    fn align_path(
        &self,
        log_probs: &[Vec<f32>],
        tokens: &[usize],
    ) -> Result<Vec<(usize, usize)>, AssessmentError>;
}

pub trait WordGrouper: Send + Sync {
    fn group_words(
        &self,
        path: &[(usize, usize)],
        token_sequence: &TokenSequence,
        word_sep_id: usize,
        stride_secs: f64,
    ) -> Vec<WordSpan>;
}

pub struct AlignmentRequest<'a> {
    pub audio: &'a CanonicalAudio,
    pub posteriors: &'a CtcPosteriors,
    pub phonemes: &'a [String],
    pub text: Option<&'a str>,
    /// Word label for each phoneme, when the reference timing carries them.
    pub phoneme_words: Option<&'a [String]>,
    /// Narrowest window the embedding stage can pool, in seconds.
    pub min_window_secs: f64,
}

/// Maps an expected phoneme sequence onto time windows.
pub trait AlignmentStrategy: Send + Sync {
    fn align(&self, request: &AlignmentRequest<'_>) -> Result<AlignmentResult, AssessmentError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TipRequest {
    pub phoneme: String,
    pub word: Option<String>,
    pub score: f32,
}

/// External text generator for articulation tips, one per weak phoneme.
pub trait TipProvider: Send + Sync {
    fn phoneme_tips(
        &self,
        sentence: &str,
        weak: &[TipRequest],
    ) -> Result<Vec<String>, AssessmentError>;
}
