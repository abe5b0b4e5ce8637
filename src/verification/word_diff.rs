use serde::Serialize;

use crate::verification::matcher::{OpTag, SequenceMatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WordDiffKind {
    Correct,
    Wrong,
    Extra,
    Missing,
}

/// Why a spoken word differs from the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordIssue {
    /// Spoken word is a prefix of the expected word; carries the dropped tail.
    MissingEnding(String),
    /// Spoken word is a suffix of the expected word; carries the dropped head.
    MissingBeginning(String),
    Substituted { expected: char, actual: char },
    ThSubstitution,
    Mispronounced,
    WordSkipped,
}

impl WordIssue {
    pub fn classify(user_word: Option<&str>, expected_word: &str) -> Self {
        let Some(user_word) = user_word.filter(|w| !w.is_empty()) else {
            return Self::WordSkipped;
        };
        let user = user_word.to_lowercase();
        let expected = expected_word.to_lowercase();

        if expected.len() > user.len() {
            if let Some(rest) = expected.strip_prefix(user.as_str()) {
                return Self::MissingEnding(rest.to_string());
            }
            if let Some(rest) = expected.strip_suffix(user.as_str()) {
                return Self::MissingBeginning(rest.to_string());
            }
        }

        let user_chars: Vec<char> = user.chars().collect();
        let expected_chars: Vec<char> = expected.chars().collect();
        if user_chars.len() == expected_chars.len() {
            let mut diffs = user_chars
                .iter()
                .zip(&expected_chars)
                .filter(|(u, e)| u != e);
            if let (Some((&actual, &expected)), None) = (diffs.next(), diffs.next()) {
                return Self::Substituted { expected, actual };
            }
        }

        if expected.contains("th") && (user.contains('d') || user.contains('t')) {
            return Self::ThSubstitution;
        }
        Self::Mispronounced
    }

    /// Wire form, e.g. `missing_ending_s` or `substituted_t_with_d`.
    pub fn code(&self) -> String {
        match self {
            Self::MissingEnding(rest) => format!("missing_ending_{rest}"),
            Self::MissingBeginning(rest) => format!("missing_beginning_{rest}"),
            Self::Substituted { expected, actual } => {
                format!("substituted_{expected}_with_{actual}")
            }
            Self::ThSubstitution => "th_substitution".to_string(),
            Self::Mispronounced => "mispronounced".to_string(),
            Self::WordSkipped => "word_skipped".to_string(),
        }
    }
}

impl Serialize for WordIssue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordDiffEntry {
    pub kind: WordDiffKind,
    /// Index into the expected words, or into the transcript words for `Extra`.
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<WordIssue>,
}

impl WordDiffEntry {
    /// The word this entry is about: expected for everything but `Extra`.
    pub fn word(&self) -> &str {
        match self.kind {
            WordDiffKind::Extra => self.actual.as_deref().unwrap_or_default(),
            _ => self.expected.as_deref().unwrap_or_default(),
        }
    }
}

/// Word-level diff of transcript against expected words, sorted by position.
pub fn word_diff(transcript_words: &[&str], expected_words: &[&str]) -> Vec<WordDiffEntry> {
    let matcher = SequenceMatcher::new(transcript_words, expected_words);
    let mut entries = Vec::new();

    for op in matcher.opcodes() {
        match op.tag {
            OpTag::Equal => {
                for j in op.b_start..op.b_end {
                    entries.push(WordDiffEntry {
                        kind: WordDiffKind::Correct,
                        position: j,
                        expected: Some(expected_words[j].to_string()),
                        actual: Some(expected_words[j].to_string()),
                        issue: None,
                    });
                }
            }
            OpTag::Replace => {
                let span = (op.a_end - op.a_start).max(op.b_end - op.b_start);
                for offset in 0..span {
                    let j = op.b_start + offset;
                    if j >= op.b_end {
                        // Surplus spoken words inside a replace carry no expected word.
                        continue;
                    }
                    let i = op.a_start + offset;
                    let actual = (i < op.a_end).then(|| transcript_words[i]);
                    entries.push(WordDiffEntry {
                        kind: WordDiffKind::Wrong,
                        position: j,
                        expected: Some(expected_words[j].to_string()),
                        actual: actual.map(str::to_string),
                        issue: Some(WordIssue::classify(actual, expected_words[j])),
                    });
                }
            }
            OpTag::Delete => {
                for i in op.a_start..op.a_end {
                    entries.push(WordDiffEntry {
                        kind: WordDiffKind::Extra,
                        position: i,
                        expected: None,
                        actual: Some(transcript_words[i].to_string()),
                        issue: None,
                    });
                }
            }
            OpTag::Insert => {
                for j in op.b_start..op.b_end {
                    entries.push(WordDiffEntry {
                        kind: WordDiffKind::Missing,
                        position: j,
                        expected: Some(expected_words[j].to_string()),
                        actual: None,
                        issue: None,
                    });
                }
            }
        }
    }

    entries.sort_by_key(|entry| entry.position);
    entries
}
