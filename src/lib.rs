pub mod alignment;
pub mod audio;
pub mod config;
pub mod embedding;
pub mod error;
pub mod mistakes;
mod model;
pub mod pipeline;
pub mod scoring;
pub mod types;
pub mod verification;

pub use config::{AssessmentConfig, Wav2Vec2Config};
pub use error::AssessmentError;
pub use pipeline::assessment::AssessmentPipeline;
pub use pipeline::builder::AssessmentPipelineBuilder;
pub use pipeline::cancel::CancellationFlag;
pub use pipeline::context::{ModelContext, ModelHandles};
pub use pipeline::result::{
    AssessmentResult, CompletedAssessment, PhonemeFeedback, Rejection, RejectionCode,
};
pub use pipeline::runtime::Wav2Vec2Runtime;
pub use pipeline::traits::{
    AlignmentStrategy, CharPosteriorModel, EmbeddingModel, SequenceAligner, TipProvider,
    Tokenizer, Transcriber, WordGrouper,
};
pub use types::{ExpectedSentence, ReferenceAudio, ReferenceTimestamp};
