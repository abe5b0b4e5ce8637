use std::ops::Range;

use candle_core::{Device, Tensor};

use crate::error::AssessmentError;

// Absorbs float noise such as 0.2 / 0.02 = 10.000000000000002.
const FRAME_EPS: f64 = 1e-9;

/// Frame-indexed contextual embeddings for one utterance.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    data: Tensor,
    stride_secs: f64,
}

impl EmbeddingMatrix {
    /// Wraps a `(frames, dim)` tensor.
    pub fn new(data: Tensor, stride_secs: f64) -> Result<Self, AssessmentError> {
        data.dims2()
            .map_err(|e| AssessmentError::runtime("embedding matrix shape", e))?;
        if !(stride_secs > 0.0) {
            return Err(AssessmentError::runtime(
                "embedding matrix",
                format!("stride must be positive, got {stride_secs}"),
            ));
        }
        Ok(Self { data, stride_secs })
    }

    pub fn from_rows(rows: &[Vec<f32>], stride_secs: f64) -> Result<Self, AssessmentError> {
        let dim = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != dim) {
            return Err(AssessmentError::runtime("embedding matrix", "ragged rows"));
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let data = Tensor::from_vec(flat, (rows.len(), dim), &Device::Cpu)
            .map_err(|e| AssessmentError::runtime("build embedding matrix", e))?;
        Self::new(data, stride_secs)
    }

    pub fn num_frames(&self) -> usize {
        self.data.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.data.dims()[1]
    }

    pub fn stride_secs(&self) -> f64 {
        self.stride_secs
    }

    pub fn tensor(&self) -> &Tensor {
        &self.data
    }

    /// Frame rows covered by `[start, end]` seconds: `floor(start/stride)` to
    /// `ceil(end/stride)`, clipped to the matrix and never empty.
    pub fn frame_range(&self, start: f64, end: f64) -> Range<usize> {
        let frames = self.num_frames();
        if frames == 0 {
            return 0..0;
        }
        let first = ((start / self.stride_secs + FRAME_EPS).floor().max(0.0) as usize)
            .min(frames - 1);
        let last = ((end / self.stride_secs - FRAME_EPS).ceil().max(0.0) as usize).min(frames);
        first..last.max(first + 1)
    }

    /// Mean of the rows under one time window.
    pub fn pool(&self, start: f64, end: f64) -> Result<Vec<f32>, AssessmentError> {
        if self.num_frames() == 0 {
            return Err(AssessmentError::invalid_audio(
                "utterance too short to produce any embedding frame",
            ));
        }
        let rows = self.frame_range(start, end);
        self.data
            .narrow(0, rows.start, rows.len())
            .and_then(|t| t.mean(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| AssessmentError::runtime("pool embedding window", e))
    }

    /// One pooled vector per window, in order.
    pub fn pool_windows(&self, windows: &[(f64, f64)]) -> Result<Vec<Vec<f32>>, AssessmentError> {
        windows
            .iter()
            .map(|&(start, end)| self.pool(start, end))
            .collect()
    }

    /// Mean over every frame; the sentence-level summary vector.
    pub fn mean_vector(&self) -> Result<Vec<f32>, AssessmentError> {
        if self.num_frames() == 0 {
            return Err(AssessmentError::invalid_audio(
                "utterance too short to produce any embedding frame",
            ));
        }
        self.data
            .mean(0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| AssessmentError::runtime("mean embedding", e))
    }
}
