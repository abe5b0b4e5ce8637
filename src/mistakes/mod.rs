mod tips;

use serde::Serialize;

use crate::pipeline::traits::{TipProvider, TipRequest};
use crate::scoring::ScoreSheet;
use crate::verification::{VerificationResult, WordDiffKind, WordIssue};

pub use tips::{fallback_tip, strip_stress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakeKind {
    MissingWord,
    WrongWord,
    ExtraWord,
    MissingSound,
    WrongSound,
    WeakPhoneme,
}

impl MistakeKind {
    pub fn is_word_error(self) -> bool {
        matches!(self, Self::MissingWord | Self::WrongWord | Self::ExtraWord)
    }

    pub fn is_sound_error(self) -> bool {
        !self.is_word_error()
    }
}

/// Declaration order is ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Major,
    Moderate,
    Minor,
}

impl Severity {
    pub fn for_score(score: f32) -> Self {
        if score < 0.4 {
            Self::Major
        } else if score < 0.6 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mistake {
    pub kind: MistakeKind,
    pub position: usize,
    pub expected: String,
    pub actual: String,
    pub severity: Severity,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phoneme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    Excellent,
    AlmostPerfect,
    Good,
    NeedsWork,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MistakeCounts {
    pub total: usize,
    pub word_errors: usize,
    pub phoneme_errors: usize,
    pub major: usize,
    pub moderate: usize,
    pub minor: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MistakeReport {
    /// Ranked major, moderate, minor; detection order within a tier.
    pub mistakes: Vec<Mistake>,
    pub counts: MistakeCounts,
    pub summary: String,
    pub tier: FeedbackTier,
    pub message: String,
}

impl MistakeReport {
    pub fn has_mistakes(&self) -> bool {
        !self.mistakes.is_empty()
    }

    /// The highest-ranked mistakes, for compact feedback.
    pub fn top(&self, n: usize) -> &[Mistake] {
        &self.mistakes[..n.min(self.mistakes.len())]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MistakeDetector;

impl MistakeDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(
        &self,
        verification: &VerificationResult,
        sheet: Option<&ScoreSheet>,
        expected_text: &str,
        tip_provider: Option<&dyn TipProvider>,
    ) -> MistakeReport {
        let word_mistakes = word_mistakes(verification);
        let (mut phoneme_mistakes, weak_scores): (Vec<Mistake>, Vec<f32>) = sheet
            .map(weak_phoneme_mistakes)
            .unwrap_or_default()
            .into_iter()
            .unzip();
        attach_tips(&mut phoneme_mistakes, &weak_scores, expected_text, tip_provider);

        let mut counts = MistakeCounts {
            total: word_mistakes.len() + phoneme_mistakes.len(),
            word_errors: word_mistakes.len(),
            phoneme_errors: phoneme_mistakes.len(),
            ..MistakeCounts::default()
        };
        let mut mistakes = word_mistakes;
        mistakes.extend(phoneme_mistakes);
        mistakes.sort_by_key(|m| m.severity);

        for m in &mistakes {
            match m.severity {
                Severity::Major => counts.major += 1,
                Severity::Moderate => counts.moderate += 1,
                Severity::Minor => counts.minor += 1,
            }
        }
        let (tier, message) = tier_and_message(&counts);

        MistakeReport {
            summary: summarize(&mistakes),
            mistakes,
            counts,
            tier,
            message,
        }
    }
}

fn word_mistakes(verification: &VerificationResult) -> Vec<Mistake> {
    let mut out = Vec::new();
    for entry in &verification.word_diff {
        let expected = entry.expected.clone().unwrap_or_default();
        let actual = entry.actual.clone().unwrap_or_else(|| "(nothing)".to_string());
        let mistake = |kind, severity, suggestion: String, phoneme: Option<&str>| Mistake {
            kind,
            position: entry.position,
            expected: expected.clone(),
            actual: actual.clone(),
            severity,
            suggestion,
            phoneme: phoneme.map(str::to_string),
            word: Some(expected.clone()),
        };

        match entry.kind {
            WordDiffKind::Correct => {}
            WordDiffKind::Missing => out.push(Mistake {
                actual: "(not spoken)".to_string(),
                ..mistake(
                    MistakeKind::MissingWord,
                    Severity::Major,
                    format!("You skipped the word '{expected}'. Try saying the complete sentence."),
                    None,
                )
            }),
            WordDiffKind::Extra => out.push(Mistake {
                kind: MistakeKind::ExtraWord,
                position: entry.position,
                expected: "(nothing)".to_string(),
                actual: actual.clone(),
                severity: Severity::Minor,
                suggestion: format!(
                    "You added an extra word '{actual}'. Try to match the exact sentence."
                ),
                phoneme: None,
                word: Some(actual.clone()),
            }),
            WordDiffKind::Wrong => {
                let issue = entry.issue.clone().unwrap_or(WordIssue::Mispronounced);
                out.push(match issue {
                    WordIssue::MissingEnding(rest) => mistake(
                        MistakeKind::MissingSound,
                        Severity::Moderate,
                        format!(
                            "You said '{actual}' but it should be '{expected}'. Don't forget the '{rest}' at the end!"
                        ),
                        None,
                    ),
                    WordIssue::MissingBeginning(rest) => mistake(
                        MistakeKind::MissingSound,
                        Severity::Moderate,
                        format!(
                            "You said '{actual}' but it should be '{expected}'. Start with '{rest}'."
                        ),
                        None,
                    ),
                    WordIssue::Substituted {
                        expected: want,
                        actual: got,
                    } => mistake(
                        MistakeKind::WrongSound,
                        Severity::Minor,
                        format!("In '{expected}', you used '{got}' instead of '{want}'."),
                        None,
                    ),
                    WordIssue::ThSubstitution => mistake(
                        MistakeKind::WrongSound,
                        Severity::Moderate,
                        format!(
                            "In '{expected}', the 'TH' sound was pronounced as 'D' or 'T'. Put your tongue between your teeth."
                        ),
                        Some("TH"),
                    ),
                    WordIssue::Mispronounced | WordIssue::WordSkipped => mistake(
                        MistakeKind::WrongWord,
                        Severity::Major,
                        format!("You said '{actual}' instead of '{expected}'. Practice this word."),
                        None,
                    ),
                });
            }
        }
    }
    out
}

fn weak_phoneme_mistakes(sheet: &ScoreSheet) -> Vec<(Mistake, f32)> {
    sheet
        .phoneme_scores()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_weak)
        .map(|(idx, s)| {
            let mistake = Mistake {
                kind: MistakeKind::WeakPhoneme,
                position: idx,
                expected: s.phoneme.clone(),
                actual: format!("(score: {:.2})", s.score),
                severity: Severity::for_score(s.score),
                suggestion: String::new(),
                phoneme: Some(s.phoneme.clone()),
                word: s.word.clone(),
            };
            (mistake, s.score)
        })
        .collect()
}

/// One tip per weak phoneme: generated where possible, static otherwise.
fn attach_tips(
    weak: &mut [Mistake],
    scores: &[f32],
    sentence: &str,
    provider: Option<&dyn TipProvider>,
) {
    if weak.is_empty() {
        return;
    }
    let generated = provider.and_then(|provider| {
        let requests: Vec<TipRequest> = weak
            .iter()
            .zip(scores)
            .map(|(m, &score)| TipRequest {
                phoneme: m.expected.clone(),
                word: m.word.clone(),
                score,
            })
            .collect();
        match provider.phoneme_tips(sentence, &requests) {
            Ok(tips) if tips.len() == weak.len() => Some(tips),
            Ok(tips) => {
                tracing::warn!(
                    expected = weak.len(),
                    got = tips.len(),
                    "tip count mismatch, using static tips"
                );
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "tip generation failed, using static tips");
                None
            }
        }
    });

    for (i, mistake) in weak.iter_mut().enumerate() {
        mistake.suggestion = match generated.as_ref().and_then(|tips| tips.get(i)) {
            Some(tip) if tips::is_well_formed_tip(tip) => tip.trim().to_string(),
            _ => fallback_tip(&mistake.expected),
        };
    }
}

fn tier_and_message(counts: &MistakeCounts) -> (FeedbackTier, String) {
    if counts.total == 0 {
        (
            FeedbackTier::Excellent,
            "Great job! You pronounced everything correctly!".to_string(),
        )
    } else if counts.major > 0 {
        (
            FeedbackTier::NeedsWork,
            format!(
                "Found {} significant issue(s). Let's work on them!",
                counts.major
            ),
        )
    } else if counts.moderate > 0 {
        (
            FeedbackTier::Good,
            format!(
                "Good attempt! Just {} thing(s) to improve.",
                counts.moderate
            ),
        )
    } else {
        (
            FeedbackTier::AlmostPerfect,
            format!("Almost perfect! Just {} minor detail(s).", counts.minor),
        )
    }
}

fn summarize(mistakes: &[Mistake]) -> String {
    if mistakes.is_empty() {
        return "Perfect pronunciation!".to_string();
    }
    let words = mistakes.iter().filter(|m| m.kind.is_word_error()).count();
    let sounds = mistakes.iter().filter(|m| m.kind.is_sound_error()).count();
    let mut parts = Vec::new();
    if words > 0 {
        parts.push(format!("{words} word(s)"));
    }
    if sounds > 0 {
        parts.push(format!("{sounds} sound(s)"));
    }
    format!("Work on: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssessmentError;
    use crate::scoring::PhonemeScore;
    use crate::verification::SpeechVerifier;

    fn weak(phoneme: &str, score: f32, word: &str) -> PhonemeScore {
        PhonemeScore {
            phoneme: phoneme.to_string(),
            score,
            is_weak: score < 0.7,
            start: None,
            end: None,
            word: Some(word.to_string()),
            position: None,
        }
    }

    fn sheet(scores: Vec<PhonemeScore>) -> ScoreSheet {
        ScoreSheet::PerPhoneme { scores }
    }

    struct FailingTips;

    impl TipProvider for FailingTips {
        fn phoneme_tips(
            &self,
            _sentence: &str,
            _weak: &[TipRequest],
        ) -> Result<Vec<String>, AssessmentError> {
            Err(AssessmentError::collaborator("rate limited"))
        }
    }

    struct EchoTips;

    impl TipProvider for EchoTips {
        fn phoneme_tips(
            &self,
            _sentence: &str,
            weak: &[TipRequest],
        ) -> Result<Vec<String>, AssessmentError> {
            Ok(weak
                .iter()
                .map(|w| {
                    if w.phoneme == "BAD" {
                        String::new()
                    } else {
                        format!("Work on {} ({:.2})", w.phoneme, w.score)
                    }
                })
                .collect())
        }
    }

    #[test]
    fn clean_attempt_is_perfect() {
        let verification = SpeechVerifier::default().evaluate("the cat sat", "the cat sat");
        let report = MistakeDetector::new().detect(
            &verification,
            Some(&sheet(vec![weak("DH", 0.9, "the")])),
            "the cat sat",
            None,
        );
        assert!(!report.has_mistakes());
        assert_eq!(report.summary, "Perfect pronunciation!");
        assert_eq!(report.tier, FeedbackTier::Excellent);
    }

    #[test]
    fn word_issues_map_to_typed_mistakes() {
        let verification =
            SpeechVerifier::default().evaluate("she sell seashells", "she sells seashells");
        let report = MistakeDetector::new().detect(&verification, None, "she sells seashells", None);
        assert_eq!(report.mistakes.len(), 1);
        let m = &report.mistakes[0];
        assert_eq!(m.kind, MistakeKind::MissingSound);
        assert_eq!(m.severity, Severity::Moderate);
        assert_eq!(
            m.suggestion,
            "You said 'sell' but it should be 'sells'. Don't forget the 's' at the end!"
        );
        assert_eq!(report.summary, "Work on: 1 sound(s)");
        assert_eq!(report.tier, FeedbackTier::Good);
    }

    #[test]
    fn missing_and_extra_words() {
        let verification = SpeechVerifier::default().evaluate("the big cat", "the cat sat");
        let report = MistakeDetector::new().detect(&verification, None, "the cat sat", None);
        let kinds: Vec<MistakeKind> = report.mistakes.iter().map(|m| m.kind).collect();
        // major first, then minor
        assert_eq!(kinds, vec![MistakeKind::MissingWord, MistakeKind::ExtraWord]);
        assert_eq!(report.mistakes[0].actual, "(not spoken)");
        assert_eq!(report.mistakes[1].word.as_deref(), Some("big"));
        assert_eq!(report.summary, "Work on: 2 word(s)");
        assert_eq!(report.counts.major, 1);
        assert_eq!(report.counts.minor, 1);
        assert_eq!(report.tier, FeedbackTier::NeedsWork);
    }

    #[test]
    fn th_substitution_carries_phoneme() {
        let verification = SpeechVerifier::default().evaluate("dat is it", "that is it");
        let report = MistakeDetector::new().detect(&verification, None, "that is it", None);
        let m = &report.mistakes[0];
        assert_eq!(m.kind, MistakeKind::WrongSound);
        assert_eq!(m.phoneme.as_deref(), Some("TH"));
        assert_eq!(m.severity, Severity::Moderate);
    }

    #[test]
    fn weak_phoneme_severity_and_fallback_tips() {
        let verification = SpeechVerifier::default().evaluate("the cat sat", "the cat sat");
        let scores = sheet(vec![
            weak("DH", 0.35, "the"),
            weak("AE1", 0.5, "cat"),
            weak("S", 0.65, "sat"),
            weak("T", 0.7, "sat"),
        ]);
        let report = MistakeDetector::new().detect(
            &verification,
            Some(&scores),
            "the cat sat",
            Some(&FailingTips),
        );
        assert_eq!(report.counts.phoneme_errors, 3);
        let severities: Vec<Severity> = report.mistakes.iter().map(|m| m.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Major, Severity::Moderate, Severity::Minor]
        );
        assert_eq!(report.mistakes[0].actual, "(score: 0.35)");
        assert_eq!(
            report.mistakes[0].suggestion,
            "Put tongue between teeth, add voice for 'TH' in 'the'."
        );
        assert_eq!(report.mistakes[2].suggestion, "Keep tongue behind teeth for a clear 'S'.");
        assert_eq!(report.summary, "Work on: 3 sound(s)");
    }

    #[test]
    fn generated_tips_used_when_well_formed() {
        let verification = SpeechVerifier::default().evaluate("the cat sat", "the cat sat");
        let scores = sheet(vec![weak("R", 0.5, "red"), weak("BAD", 0.5, "x")]);
        let report = MistakeDetector::new().detect(
            &verification,
            Some(&scores),
            "red x",
            Some(&EchoTips),
        );
        assert_eq!(report.mistakes[0].suggestion, "Work on R (0.50)");
        assert_eq!(
            report.mistakes[1].suggestion,
            "Practice the 'BAD' sound more carefully."
        );
    }

    #[test]
    fn sentence_level_sheet_has_no_phoneme_mistakes() {
        let verification = SpeechVerifier::default().evaluate("the cat sat", "the cat sat");
        let report = MistakeDetector::new().detect(
            &verification,
            Some(&ScoreSheet::Sentence {
                similarity: 0.4,
                phoneme_count: 5,
            }),
            "the cat sat",
            None,
        );
        assert!(!report.has_mistakes());
    }
}
