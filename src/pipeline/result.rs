use serde::Serialize;

use crate::error::AssessmentError;
use crate::mistakes::MistakeReport;
use crate::pipeline::state::{PipelineState, StageTrace};
use crate::scoring::{PhonemeScore, PhonemeStats, UnscorableResult};
use crate::verification::{VerificationResult, VerificationStatus};

/// Terminal outcome of one assessment. Serializes flat, with `success` and
/// (for rejections) `error` as the discriminating fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AssessmentResult {
    Completed(Box<CompletedAssessment>),
    Rejected(Rejection),
    Simulated(SimulatedAssessment),
}

impl AssessmentResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Stable discriminant: `completed`, `simulated` or the rejection code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Simulated(_) => "simulated",
            Self::Rejected(rejection) => rejection.error.as_str(),
        }
    }

    pub fn stages(&self) -> &[PipelineState] {
        match self {
            Self::Completed(done) => done.stages.states(),
            Self::Rejected(rejection) => rejection.stages.states(),
            Self::Simulated(simulated) => simulated.stages.states(),
        }
    }

    pub fn processing_time_ms(&self) -> u64 {
        match self {
            Self::Completed(done) => done.processing_time_ms,
            Self::Rejected(rejection) => rejection.processing_time_ms,
            Self::Simulated(simulated) => simulated.processing_time_ms,
        }
    }

    pub fn completed(&self) -> Option<&CompletedAssessment> {
        match self {
            Self::Completed(done) => Some(&**done),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, AssessmentError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AssessmentError::json("serialize assessment result", e))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub status: VerificationStatus,
    pub transcript: String,
    pub similarity: f64,
    pub message: String,
}

impl From<&VerificationResult> for VerificationSummary {
    fn from(result: &VerificationResult) -> Self {
        Self {
            status: result.status,
            transcript: result.transcript.clone(),
            similarity: result.similarity,
            message: result.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedAssessment {
    pub success: bool,
    pub sentence_id: String,
    pub overall_score: f64,
    pub fluency_score: f64,
    pub clarity_score: f64,
    /// `phoneme`, or `sentence` when only a sentence-level reference exists.
    pub score_resolution: &'static str,
    pub phoneme_scores: Vec<PhonemeScore>,
    pub weak_phonemes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<PhonemeStats>,
    pub mistake_report: MistakeReport,
    pub verification: VerificationSummary,
    pub stages: StageTrace,
    pub processing_time_ms: u64,
}

/// Read-only per-phoneme slice handed to feedback generators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhonemeFeedback {
    pub phoneme: String,
    pub score: f32,
    pub is_weak: bool,
}

impl CompletedAssessment {
    pub fn feedback_view(&self) -> Vec<PhonemeFeedback> {
        self.phoneme_scores
            .iter()
            .map(|s| PhonemeFeedback {
                phoneme: s.phoneme.clone(),
                score: s.score,
                is_weak: s.is_weak,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    ContentMismatch,
    Unscorable,
    NoReferenceAudio,
    InvalidAudio,
    InvalidInput,
    ModelUnavailable,
    Timeout,
    Cancelled,
    Internal,
}

impl RejectionCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentMismatch => "content_mismatch",
            Self::Unscorable => "unscorable",
            Self::NoReferenceAudio => "no_reference_audio",
            Self::InvalidAudio => "invalid_audio",
            Self::InvalidInput => "invalid_input",
            Self::ModelUnavailable => "model_unavailable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    fn for_error(err: &AssessmentError) -> Self {
        match err.code() {
            "invalid_audio" => Self::InvalidAudio,
            "invalid_input" => Self::InvalidInput,
            "model_unavailable" => Self::ModelUnavailable,
            "timeout" => Self::Timeout,
            "no_reference_audio" => Self::NoReferenceAudio,
            "cancelled" => Self::Cancelled,
            _ => Self::Internal,
        }
    }

    fn suggestion(self) -> &'static str {
        match self {
            Self::ContentMismatch => "Listen to the sentence again and say it exactly as written.",
            Self::Unscorable => "Please try recording again.",
            Self::NoReferenceAudio => {
                "Generate or upload reference audio for this sentence, or enable simulated mode."
            }
            Self::InvalidAudio => {
                "Record again and upload a non-empty WAV or FLAC file."
            }
            Self::InvalidInput => {
                "Fix the sentence record: it needs a phoneme sequence and matching timestamps."
            }
            Self::ModelUnavailable => {
                "Check that the acoustic model files are installed, or enable simulated mode."
            }
            Self::Timeout => "Try again with a shorter recording.",
            Self::Cancelled => "Submit the recording again when ready.",
            Self::Internal => "Please try again.",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub success: bool,
    pub error: RejectionCode,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribed: Option<String>,
    /// Finer-grained cause, e.g. the unscorable reason code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSummary>,
    pub stages: StageTrace,
    pub processing_time_ms: u64,
}

impl Rejection {
    fn base(code: RejectionCode, message: String, stages: StageTrace) -> Self {
        Self {
            success: false,
            error: code,
            message,
            suggestion: code.suggestion().to_string(),
            transcribed: None,
            reason: None,
            verification: None,
            stages,
            processing_time_ms: 0,
        }
    }

    pub(crate) fn content_mismatch(verification: &VerificationResult, stages: StageTrace) -> Self {
        Self {
            transcribed: Some(verification.transcript.clone()),
            reason: Some(
                match verification.status {
                    VerificationStatus::Error => "transcription_failed",
                    _ => "low_similarity",
                }
                .to_string(),
            ),
            verification: Some(verification.into()),
            ..Self::base(
                RejectionCode::ContentMismatch,
                verification.message.clone(),
                stages,
            )
        }
    }

    pub(crate) fn unscorable(
        unscorable: UnscorableResult,
        verification: &VerificationResult,
        stages: StageTrace,
    ) -> Self {
        Self {
            suggestion: unscorable.suggestion,
            reason: Some(unscorable.reason.code().to_string()),
            transcribed: Some(verification.transcript.clone()),
            verification: Some(verification.into()),
            ..Self::base(RejectionCode::Unscorable, unscorable.message, stages)
        }
    }

    pub(crate) fn from_error(err: &AssessmentError, stages: StageTrace) -> Self {
        Self::base(RejectionCode::for_error(err), err.to_string(), stages)
    }

    pub(crate) fn with_processing_time(mut self, ms: u64) -> Self {
        self.processing_time_ms = ms;
        self
    }
}

/// Explicitly labeled stand-in used when real assessment is impossible and
/// simulated mode is enabled. Carries no scores.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedAssessment {
    pub success: bool,
    pub simulated: bool,
    pub sentence_id: String,
    pub reason: RejectionCode,
    pub message: String,
    pub phoneme_count: usize,
    pub stages: StageTrace,
    pub processing_time_ms: u64,
}

impl SimulatedAssessment {
    pub(crate) fn new(
        sentence_id: &str,
        phoneme_count: usize,
        err: &AssessmentError,
        stages: StageTrace,
    ) -> Self {
        let reason = RejectionCode::for_error(err);
        let message = match reason {
            RejectionCode::NoReferenceAudio => {
                "Reference audio not available for this sentence. Showing a simulated result; \
                 upload reference audio for a real assessment."
                    .to_string()
            }
            _ => format!("Assessment models unavailable ({err}). Showing a simulated result."),
        };
        Self {
            success: true,
            simulated: true,
            sentence_id: sentence_id.to_string(),
            reason,
            message,
            phoneme_count,
            stages,
            processing_time_ms: 0,
        }
    }
}
