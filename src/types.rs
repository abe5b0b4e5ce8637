use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::embedding::ReferenceEmbeddings;

/// A known target sentence and everything precomputed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedSentence {
    pub id: String,
    pub text: String,
    pub phonemes: Vec<String>,
    /// Same length and order as `phonemes`.
    pub reference_timestamps: Vec<ReferenceTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<ReferenceAudio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_embeddings: Option<ReferenceEmbeddings>,
}

impl ExpectedSentence {
    /// Word label per phoneme, if every reference timestamp carries one.
    pub fn phoneme_words(&self) -> Option<Vec<String>> {
        if self.reference_timestamps.len() != self.phonemes.len() {
            return None;
        }
        self.reference_timestamps
            .iter()
            .map(|ts| ts.word.clone())
            .collect()
    }

    pub fn reference_duration_secs(&self) -> Option<f64> {
        self.reference_timestamps
            .last()
            .map(|ts| ts.end)
            .filter(|end| *end > 0.0)
    }
}

/// One phoneme's span in the reference recording.
///
/// `start` and `end` are seconds from the start of the canonical reference
/// waveform, i.e. after resampling and leading-silence trimming. Timings
/// measured on the raw file must be shifted by the trimmed lead-in first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTimestamp {
    pub phoneme: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceAudio {
    /// Encoded audio bytes (WAV or FLAC).
    Encoded(Vec<u8>),
    File(PathBuf),
}

/// Mono waveform at the pipeline's target rate, trimmed and peak-normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAudio {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl CanonicalAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonemePosition {
    Initial,
    Medial,
    Final,
}

impl PhonemePosition {
    pub fn within_word(index: usize, word_len: usize) -> Self {
        if index == 0 {
            Self::Initial
        } else if index + 1 == word_len {
            Self::Final
        } else {
            Self::Medial
        }
    }
}

/// One aligned phoneme window, in seconds from the start of the canonical waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhonemeTimestamp {
    pub phoneme: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    pub position: PhonemePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentResult {
    pub phonemes: Vec<PhonemeTimestamp>,
    /// Detected speech span the windows were distributed over.
    pub speech_start: f64,
    pub speech_end: f64,
}

/// Contiguous run of one emitted character in a greedy CTC decode.
#[derive(Debug, Clone, PartialEq)]
pub struct CharSegment {
    pub ch: char,
    pub start: f64,
    pub end: f64,
}

/// Word-level span recovered from a CTC Viterbi path, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Per-frame character log-posteriors from a CTC head.
#[derive(Debug, Clone)]
pub struct CtcPosteriors {
    /// `frames x vocab`, already log-softmaxed.
    pub log_probs: Vec<Vec<f32>>,
    pub stride_secs: f64,
    pub vocab: HashMap<char, usize>,
    pub blank_id: usize,
    pub word_sep_id: usize,
}

impl CtcPosteriors {
    pub fn num_frames(&self) -> usize {
        self.log_probs.len()
    }

    pub fn id_to_char(&self) -> HashMap<usize, char> {
        self.vocab.iter().map(|(&c, &id)| (id, c)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TokenSequence {
    pub tokens: Vec<usize>,
    pub chars: Vec<Option<char>>,
    /// Transcript normalized with the same logic as emitted token chars.
    pub normalized_words: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: &[Option<&str>]) -> ExpectedSentence {
        let phonemes: Vec<String> = (0..words.len()).map(|i| format!("P{i}")).collect();
        ExpectedSentence {
            id: "s".to_string(),
            text: "a b".to_string(),
            reference_timestamps: phonemes
                .iter()
                .zip(words)
                .enumerate()
                .map(|(i, (p, w))| ReferenceTimestamp {
                    phoneme: p.clone(),
                    start: i as f64 * 0.1,
                    end: (i + 1) as f64 * 0.1,
                    word: w.map(str::to_string),
                })
                .collect(),
            phonemes,
            reference_audio: None,
            reference_embeddings: None,
        }
    }

    #[test]
    fn phoneme_words_requires_every_label() {
        let labeled = sentence(&[Some("a"), Some("b")]);
        assert_eq!(
            labeled.phoneme_words(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        let partial = sentence(&[Some("a"), None]);
        assert_eq!(partial.phoneme_words(), None);
    }

    #[test]
    fn reference_duration_uses_last_end() {
        let s = sentence(&[Some("a"), Some("b"), Some("b")]);
        let duration = s.reference_duration_secs().expect("duration");
        assert!((duration - 0.3).abs() < 1e-9);
    }

    #[test]
    fn position_within_word() {
        assert_eq!(PhonemePosition::within_word(0, 3), PhonemePosition::Initial);
        assert_eq!(PhonemePosition::within_word(1, 3), PhonemePosition::Medial);
        assert_eq!(PhonemePosition::within_word(2, 3), PhonemePosition::Final);
        assert_eq!(PhonemePosition::within_word(0, 1), PhonemePosition::Initial);
    }

    #[test]
    fn canonical_audio_duration() {
        let audio = CanonicalAudio {
            samples: vec![0.0; 8_000],
            sample_rate_hz: 16_000,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reference_audio_round_trips_through_json() {
        let audio = ReferenceAudio::File(PathBuf::from("refs/s1.wav"));
        let json = serde_json::to_string(&audio).expect("serialize");
        assert_eq!(json, r#"{"file":"refs/s1.wav"}"#);
        let back: ReferenceAudio = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, audio);
    }
}
