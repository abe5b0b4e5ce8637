use std::collections::HashMap;

use crate::alignment::tokenization::build_token_sequence;
use crate::alignment::viterbi::{ctc_viterbi_path, min_frames_for};
use crate::alignment::word_spans::group_path_into_words;
use crate::alignment::WordBoundaryAligner;
use crate::error::AssessmentError;
use crate::pipeline::traits::{AlignmentStrategy, SequenceAligner, Tokenizer, WordGrouper};
use crate::types::{TokenSequence, WordSpan};

/// Matches the vocabulary's letter case and drops characters it lacks.
pub struct CaseAwareTokenizer;

impl Tokenizer for CaseAwareTokenizer {
    fn tokenize(
        &self,
        transcript: &str,
        vocab: &HashMap<char, usize>,
        blank_id: usize,
        word_sep_id: usize,
    ) -> TokenSequence {
        build_token_sequence(transcript, vocab, blank_id, word_sep_id)
    }
}

pub struct ViterbiSequenceAligner {
    blank_id: usize,
}

impl ViterbiSequenceAligner {
    pub fn new(blank_id: usize) -> Self {
        Self { blank_id }
    }
}

impl Default for ViterbiSequenceAligner {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SequenceAligner for ViterbiSequenceAligner {
    fn align_path(
        &self,
        log_probs: &[Vec<f32>],
        tokens: &[usize],
    ) -> Result<Vec<(usize, usize)>, AssessmentError> {
        let needed = min_frames_for(tokens, self.blank_id);
        if log_probs.len() < needed {
            return Err(AssessmentError::invalid_audio(format!(
                "audio too short for transcript: {} frames < {needed} required",
                log_probs.len()
            )));
        }
        Ok(ctc_viterbi_path(log_probs, tokens))
    }
}

pub struct PathWordGrouper;

impl WordGrouper for PathWordGrouper {
    fn group_words(
        &self,
        path: &[(usize, usize)],
        token_sequence: &TokenSequence,
        _word_sep_id: usize,
        stride_secs: f64,
    ) -> Vec<WordSpan> {
        group_path_into_words(path, token_sequence, stride_secs)
    }
}

/// Word-boundary alignment with the default tokenizer, Viterbi aligner and
/// path grouper; falls back to proportional distribution on its own.
pub fn default_alignment_strategy() -> Box<dyn AlignmentStrategy> {
    Box::new(WordBoundaryAligner::new(
        Box::new(CaseAwareTokenizer),
        Box::new(ViterbiSequenceAligner::default()),
        Box::new(PathWordGrouper),
    ))
}
