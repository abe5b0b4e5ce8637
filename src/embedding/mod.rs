mod matrix;
pub mod reference;

use serde::{Deserialize, Serialize};

use crate::error::AssessmentError;

pub use matrix::EmbeddingMatrix;
pub use reference::{ReferenceEmbeddingCache, ReferenceEmbeddingProvider};

/// Cached reference vectors for one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceEmbeddings {
    /// One vector per expected phoneme, same order.
    PerPhoneme(Vec<Vec<f32>>),
    /// A single utterance-level vector, used when phoneme timing is unavailable.
    Sentence(Vec<f32>),
}

impl ReferenceEmbeddings {
    pub fn len(&self) -> usize {
        match self {
            Self::PerPhoneme(vectors) => vectors.len(),
            Self::Sentence(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::PerPhoneme(vectors) => vectors.is_empty(),
            Self::Sentence(vector) => vector.is_empty(),
        }
    }

    /// MessagePack encoding; f32 values are stored as-is and decode bit-identically.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AssessmentError> {
        rmp_serde::to_vec_named(self).map_err(|e| AssessmentError::codec("encode", e))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssessmentError> {
        rmp_serde::from_slice(bytes).map_err(|e| AssessmentError::codec("decode", e))
    }
}
