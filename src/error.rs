use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("unreadable audio: {message}")]
    InvalidAudio { message: String },
    #[error("{model} model unavailable: {message}")]
    ModelUnavailable {
        model: &'static str,
        message: String,
    },
    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },
    #[error("sentence '{sentence_id}' has no cached reference embeddings and no reference audio")]
    NoReferenceAudio { sentence_id: String },
    #[error("assessment cancelled before {stage}")]
    Cancelled { stage: &'static str },
    #[error("reference embedding codec error while {context}: {message}")]
    Codec {
        context: &'static str,
        message: String,
    },
    #[error("collaborator failure: {message}")]
    Collaborator { message: String },
}

impl AssessmentError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_audio(message: impl Into<String>) -> Self {
        Self::InvalidAudio {
            message: message.into(),
        }
    }

    pub fn model_unavailable(model: &'static str, err: impl std::fmt::Display) -> Self {
        Self::ModelUnavailable {
            model,
            message: err.to_string(),
        }
    }

    pub(crate) fn codec(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Codec {
            context,
            message: err.to_string(),
        }
    }

    pub fn collaborator(err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            message: err.to_string(),
        }
    }

    /// Stable discriminant used in rejection payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAudio { .. } => "invalid_audio",
            Self::InvalidInput { .. } => "invalid_input",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::NoReferenceAudio { .. } => "no_reference_audio",
            Self::Cancelled { .. } => "cancelled",
            Self::Io { .. }
            | Self::Json { .. }
            | Self::Runtime { .. }
            | Self::Codec { .. }
            | Self::Collaborator { .. } => "internal",
        }
    }
}
