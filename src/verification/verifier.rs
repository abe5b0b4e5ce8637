use serde::Serialize;

use crate::config::VerificationConfig;
use crate::error::AssessmentError;
use crate::pipeline::traits::Transcriber;
use crate::types::CanonicalAudio;
use crate::verification::matcher::char_ratio;
use crate::verification::word_diff::{word_diff, WordDiffEntry, WordDiffKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Match,
    Partial,
    Mismatch,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub transcript: String,
    pub expected: String,
    /// Character-level ratio of the normalized strings, rounded to 3 decimals.
    pub similarity: f64,
    pub word_diff: Vec<WordDiffEntry>,
    pub can_proceed: bool,
    pub message: String,
}

impl VerificationResult {
    pub fn missing_words(&self) -> impl Iterator<Item = &WordDiffEntry> {
        self.entries_of(WordDiffKind::Missing)
    }

    pub fn extra_words(&self) -> impl Iterator<Item = &WordDiffEntry> {
        self.entries_of(WordDiffKind::Extra)
    }

    pub fn wrong_words(&self) -> impl Iterator<Item = &WordDiffEntry> {
        self.entries_of(WordDiffKind::Wrong)
    }

    fn entries_of(&self, kind: WordDiffKind) -> impl Iterator<Item = &WordDiffEntry> {
        self.word_diff.iter().filter(move |entry| entry.kind == kind)
    }
}

/// Gatekeeper that keeps utterances of the wrong sentence from being scored.
#[derive(Debug, Clone, Default)]
pub struct SpeechVerifier {
    config: VerificationConfig,
}

impl SpeechVerifier {
    pub fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    /// Transcribes `audio` and evaluates the transcript. Ordinary transcription
    /// failures become an `Error` verdict; timeouts, cancellation and missing
    /// models are returned to the caller.
    pub fn verify(
        &self,
        transcriber: &dyn Transcriber,
        audio: &CanonicalAudio,
        expected_text: &str,
    ) -> Result<VerificationResult, AssessmentError> {
        match transcriber.transcribe(audio) {
            Ok(transcript) => Ok(self.evaluate(&transcript, expected_text)),
            Err(
                err @ (AssessmentError::Timeout { .. }
                | AssessmentError::Cancelled { .. }
                | AssessmentError::ModelUnavailable { .. }),
            ) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "transcription failed");
                Ok(self.evaluate("", expected_text))
            }
        }
    }

    pub fn evaluate(&self, transcript: &str, expected_text: &str) -> VerificationResult {
        let transcript_norm = transcript.trim().to_lowercase();
        if transcript_norm.is_empty() {
            tracing::warn!("empty transcription");
            return VerificationResult {
                status: VerificationStatus::Error,
                transcript: String::new(),
                expected: expected_text.to_string(),
                similarity: 0.0,
                word_diff: Vec::new(),
                can_proceed: false,
                message: "Could not transcribe audio. Please speak more clearly.".to_string(),
            };
        }
        let expected_norm = expected_text.trim().to_lowercase();

        let similarity = char_ratio(&transcript_norm, &expected_norm);
        let transcript_words: Vec<&str> = transcript_norm.split_whitespace().collect();
        let expected_words: Vec<&str> = expected_norm.split_whitespace().collect();
        let word_diff = word_diff(&transcript_words, &expected_words);

        let (status, can_proceed) = if similarity >= self.config.match_threshold {
            (VerificationStatus::Match, true)
        } else if similarity >= self.config.proceed_threshold {
            (VerificationStatus::Partial, true)
        } else {
            (VerificationStatus::Mismatch, false)
        };

        let mut result = VerificationResult {
            status,
            transcript: transcript.to_string(),
            expected: expected_text.to_string(),
            similarity: round3(similarity),
            word_diff,
            can_proceed,
            message: String::new(),
        };
        result.message = match status {
            VerificationStatus::Mismatch => format!(
                "It sounds like you said something different. Please try saying: '{expected_text}'"
            ),
            VerificationStatus::Partial => {
                let to_improve = result.missing_words().count() + result.wrong_words().count();
                format!("Good attempt! Found {to_improve} word(s) to improve.")
            }
            _ => "Great! You said the sentence correctly.".to_string(),
        };

        tracing::debug!(
            status = ?result.status,
            similarity = result.similarity,
            diff_entries = result.word_diff.len(),
            "speech verified"
        );
        result
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::word_diff::WordIssue;

    struct FixedTranscriber(Result<String, &'static str>);

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, _audio: &CanonicalAudio) -> Result<String, AssessmentError> {
            self.0
                .clone()
                .map_err(|msg| AssessmentError::runtime("transcribe", msg))
        }
    }

    fn audio() -> CanonicalAudio {
        CanonicalAudio {
            samples: vec![0.1; 1600],
            sample_rate_hz: 16_000,
        }
    }

    #[test]
    fn partial_match_with_missing_ending() {
        let result = SpeechVerifier::default().evaluate("She sell seashells", "She sells seashells");
        assert_eq!(result.status, VerificationStatus::Partial);
        assert!(result.can_proceed);
        let wrong: Vec<_> = result.wrong_words().collect();
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].position, 1);
        assert_eq!(
            wrong[0].issue,
            Some(WordIssue::MissingEnding("s".to_string()))
        );
        assert_eq!(result.message, "Good attempt! Found 1 word(s) to improve.");
    }

    #[test]
    fn mismatch_stops_pipeline() {
        let result = SpeechVerifier::default().evaluate("Completely different sentence", "The cat sat");
        assert_eq!(result.status, VerificationStatus::Mismatch);
        assert!(!result.can_proceed);
        assert!(result.similarity < 0.6);
        assert!(result.message.contains("'The cat sat'"));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let result = SpeechVerifier::default().evaluate("  THE CAT SAT ", "The cat sat");
        assert_eq!(result.status, VerificationStatus::Match);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.wrong_words().count(), 0);
    }

    #[test]
    fn similarity_is_rounded() {
        let result = SpeechVerifier::default().evaluate("she sell seashells", "she sells seashells");
        assert_eq!(result.similarity, 0.973);
    }

    #[test]
    fn empty_or_failed_transcription_is_error() {
        let verifier = SpeechVerifier::default();
        let empty = verifier
            .verify(&FixedTranscriber(Ok("   ".to_string())), &audio(), "The cat sat")
            .expect("verdict");
        assert_eq!(empty.status, VerificationStatus::Error);
        assert!(!empty.can_proceed);

        let failed = verifier
            .verify(&FixedTranscriber(Err("decoder crashed")), &audio(), "The cat sat")
            .expect("verdict");
        assert_eq!(failed.status, VerificationStatus::Error);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let verifier = SpeechVerifier::default();
        let a = verifier.evaluate("the kat sat down", "the cat sat");
        let b = verifier.evaluate("the kat sat down", "the cat sat");
        assert_eq!(a.similarity, b.similarity);
        assert_eq!(a.word_diff, b.word_diff);
        assert_eq!(a.status, b.status);
    }
}
