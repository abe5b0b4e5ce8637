use crate::alignment::audio_boundaries::detect_speech_span;
use crate::alignment::distribute::{
    assign_phonemes_to_words, build_timestamps, enforce_min_width, uniform_windows,
    windows_from_word_spans,
};
use crate::alignment::segments::{greedy_char_segments, speech_span};
use crate::alignment::viterbi::min_frames_for;
use crate::error::AssessmentError;
use crate::pipeline::traits::{
    AlignmentRequest, AlignmentStrategy, CharPosteriorModel, SequenceAligner, Tokenizer,
    WordGrouper,
};
use crate::types::{AlignmentResult, CanonicalAudio, CtcPosteriors, WordSpan};

/// Speech span from emitted characters, then from frame energy, then the whole clip.
pub fn detect_speech_bounds(posteriors: &CtcPosteriors, audio: &CanonicalAudio) -> (f64, f64) {
    let segments = greedy_char_segments(posteriors);
    if let Some(span) = speech_span(&segments) {
        return span;
    }
    let frame_ms = posteriors.stride_secs * 1000.0;
    if let Some(span) = detect_speech_span(&audio.samples, audio.sample_rate_hz, frame_ms) {
        tracing::debug!(
            start = span.0,
            end = span.1,
            "no characters emitted, using energy-based speech span"
        );
        return span;
    }
    tracing::warn!("no speech detected, distributing over the whole clip");
    (0.0, audio.duration_secs())
}

fn finish(
    request: &AlignmentRequest<'_>,
    windows: Vec<(f64, f64)>,
    groups: &[usize],
    word_names: &[String],
    span: (f64, f64),
) -> AlignmentResult {
    let windows = enforce_min_width(
        &windows,
        request.min_window_secs,
        0.0,
        request.audio.duration_secs().max(span.1),
    );
    AlignmentResult {
        phonemes: build_timestamps(request.phonemes, &windows, groups, word_names),
        speech_start: span.0,
        speech_end: span.1,
    }
}

/// Spreads the detected speech span evenly over all phonemes. Word labels,
/// when present, only feed the position metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProportionalAligner;

impl AlignmentStrategy for ProportionalAligner {
    fn align(&self, request: &AlignmentRequest<'_>) -> Result<AlignmentResult, AssessmentError> {
        let span = detect_speech_bounds(request.posteriors, request.audio);
        let n = request.phonemes.len();
        let windows = uniform_windows(n, span.0, span.1);

        let (groups, names) = match request.phoneme_words {
            Some(labels) if labels.len() == n => {
                let groups = assign_phonemes_to_words(n, Some(labels), &[]);
                let mut names: Vec<String> = Vec::new();
                for (i, label) in labels.iter().enumerate() {
                    if i == 0 || labels[i - 1] != *label {
                        names.push(label.clone());
                    }
                }
                (groups, names)
            }
            _ => (vec![0; n], Vec::new()),
        };
        Ok(finish(request, windows, &groups, &names, span))
    }
}

/// Estimates word boundaries by CTC-aligning the expected text against the
/// posteriors, then spreads each word's span over that word's phonemes.
pub struct WordBoundaryAligner {
    tokenizer: Box<dyn Tokenizer>,
    sequence_aligner: Box<dyn SequenceAligner>,
    word_grouper: Box<dyn WordGrouper>,
}

impl WordBoundaryAligner {
    pub fn new(
        tokenizer: Box<dyn Tokenizer>,
        sequence_aligner: Box<dyn SequenceAligner>,
        word_grouper: Box<dyn WordGrouper>,
    ) -> Self {
        Self {
            tokenizer,
            sequence_aligner,
            word_grouper,
        }
    }

    fn word_spans(
        &self,
        posteriors: &CtcPosteriors,
        text: &str,
    ) -> Result<Vec<WordSpan>, AssessmentError> {
        let token_sequence = self.tokenizer.tokenize(
            text,
            &posteriors.vocab,
            posteriors.blank_id,
            posteriors.word_sep_id,
        );
        if token_sequence.normalized_words.is_empty() {
            return Ok(Vec::new());
        }
        let needed = min_frames_for(&token_sequence.tokens, posteriors.blank_id);
        if needed > posteriors.num_frames() {
            tracing::warn!(
                needed_frames = needed,
                frames = posteriors.num_frames(),
                "utterance too short for the expected text"
            );
            return Ok(Vec::new());
        }
        let path = self
            .sequence_aligner
            .align_path(&posteriors.log_probs, &token_sequence.tokens)?;
        let spans = self.word_grouper.group_words(
            &path,
            &token_sequence,
            posteriors.word_sep_id,
            posteriors.stride_secs,
        );
        if spans.len() != token_sequence.normalized_words.len() {
            tracing::warn!(
                expected = token_sequence.normalized_words.len(),
                got = spans.len(),
                "word grouping lost words"
            );
            return Ok(Vec::new());
        }
        Ok(spans)
    }
}

impl AlignmentStrategy for WordBoundaryAligner {
    fn align(&self, request: &AlignmentRequest<'_>) -> Result<AlignmentResult, AssessmentError> {
        let Some(text) = request.text else {
            return ProportionalAligner.align(request);
        };
        let spans = self.word_spans(request.posteriors, text)?;
        if spans.is_empty() {
            return ProportionalAligner.align(request);
        }

        let n = request.phonemes.len();
        let word_lengths: Vec<usize> = spans.iter().map(|s| s.word.chars().count()).collect();
        let groups = assign_phonemes_to_words(n, request.phoneme_words, &word_lengths);
        let windows = windows_from_word_spans(&groups, &spans);

        let names: Vec<String> = match request.phoneme_words {
            Some(labels) if labels.len() == n && groups.last().map_or(0, |g| g + 1) == spans.len() => {
                spans
                    .iter()
                    .enumerate()
                    .map(|(w, span)| {
                        groups
                            .iter()
                            .position(|&g| g == w)
                            .map_or_else(|| span.word.clone(), |i| labels[i].clone())
                    })
                    .collect()
            }
            _ => spans.iter().map(|s| s.word.to_lowercase()).collect(),
        };
        let span = (
            spans.first().map_or(0.0, |s| s.start),
            spans.last().map_or(0.0, |s| s.end),
        );
        tracing::debug!(words = spans.len(), phonemes = n, "word-boundary alignment");
        Ok(finish(request, windows, &groups, &names, span))
    }
}

/// Obtains posteriors from the acoustic model and hands them to the strategy.
pub struct ForcedAligner {
    strategy: Box<dyn AlignmentStrategy>,
}

impl ForcedAligner {
    pub fn new(strategy: Box<dyn AlignmentStrategy>) -> Self {
        Self { strategy }
    }

    pub fn align(
        &self,
        model: &dyn CharPosteriorModel,
        audio: &CanonicalAudio,
        phonemes: &[String],
        text: Option<&str>,
        phoneme_words: Option<&[String]>,
        min_window_secs: f64,
    ) -> Result<AlignmentResult, AssessmentError> {
        if phonemes.is_empty() {
            return Err(AssessmentError::invalid_input("expected phoneme sequence is empty"));
        }
        let posteriors = model.char_posteriors(audio)?;
        self.strategy.align(&AlignmentRequest {
            audio,
            posteriors: &posteriors,
            phonemes,
            text,
            phoneme_words,
            // never narrower than one posterior frame
            min_window_secs: min_window_secs.max(posteriors.stride_secs),
        })
    }
}
