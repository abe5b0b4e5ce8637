use rubato::{FftFixedInOut, Resampler};

use crate::audio::decode::{decode_audio, RawAudio};
use crate::config::PreprocessConfig;
use crate::error::AssessmentError;
use crate::types::CanonicalAudio;

const RESAMPLER_CHUNK: usize = 1024;
const TRIM_FRAME_LENGTH: usize = 2048;
const TRIM_HOP_LENGTH: usize = 512;

/// Turns uploads of any supported container, rate and channel layout into the
/// canonical waveform every later stage expects.
#[derive(Debug, Clone, Default)]
pub struct AudioPreprocessor {
    config: PreprocessConfig,
}

impl AudioPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn target_sample_rate_hz(&self) -> u32 {
        self.config.target_sample_rate_hz
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<CanonicalAudio, AssessmentError> {
        let raw = decode_audio(bytes)?;
        self.preprocess_raw(&raw)
    }

    pub fn preprocess_raw(&self, raw: &RawAudio) -> Result<CanonicalAudio, AssessmentError> {
        if raw.sample_rate_hz == 0 {
            return Err(AssessmentError::invalid_audio("sample rate is zero"));
        }
        let mono = raw.downmix();
        if mono.is_empty() {
            return Err(AssessmentError::invalid_audio("no samples"));
        }
        if mono.iter().any(|s| !s.is_finite()) {
            return Err(AssessmentError::invalid_audio("non-finite samples"));
        }

        let target = self.config.target_sample_rate_hz;
        let resampled = if raw.sample_rate_hz != target {
            tracing::debug!(from_hz = raw.sample_rate_hz, to_hz = target, "resampling");
            resample(&mono, raw.sample_rate_hz, target)?
        } else {
            mono
        };

        let trimmed = trim_silence(&resampled, self.config.trim_db);
        let samples = peak_normalize(trimmed, self.config.headroom);
        if samples.is_empty() {
            return Err(AssessmentError::invalid_audio("empty after preprocessing"));
        }

        Ok(CanonicalAudio {
            samples,
            sample_rate_hz: target,
        })
    }
}

/// FFT resampling with the resampler's latency removed, so sample `i` of the
/// output lines up with time `i / to_hz` of the input.
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>, AssessmentError> {
    if from_hz == to_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler =
        FftFixedInOut::<f32>::new(from_hz as usize, to_hz as usize, RESAMPLER_CHUNK, 1)
            .map_err(|e| AssessmentError::runtime("create resampler", e))?;

    let expected_len =
        (samples.len() as u64 * to_hz as u64).div_ceil(from_hz as u64) as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected_len + delay + RESAMPLER_CHUNK);

    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let chunk = resampler
            .process(&[&samples[pos..pos + needed]], None)
            .map_err(|e| AssessmentError::runtime("resample", e))?;
        out.extend_from_slice(&chunk[0]);
        pos += needed;
    }
    if pos < samples.len() {
        let tail_in: [&[f32]; 1] = [&samples[pos..]];
        let tail = resampler
            .process_partial(Some(&tail_in[..]), None)
            .map_err(|e| AssessmentError::runtime("resample tail", e))?;
        out.extend_from_slice(&tail[0]);
    }
    while out.len() < expected_len + delay {
        let flushed = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| AssessmentError::runtime("flush resampler", e))?;
        if flushed[0].is_empty() {
            break;
        }
        out.extend_from_slice(&flushed[0]);
    }

    let start = delay.min(out.len());
    let mut aligned = out.split_off(start);
    aligned.truncate(expected_len);
    Ok(aligned)
}

/// Removes leading and trailing frames whose RMS falls more than `top_db`
/// below the loudest frame. Silent (zero-peak) signals are returned unchanged.
pub fn trim_silence(samples: &[f32], top_db: f32) -> Vec<f32> {
    let rms = overlapping_frame_rms(samples, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);
    let peak = rms.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return samples.to_vec();
    }

    // Compare in the power domain: 10*log10(p/p_max) > -top_db
    let threshold = peak * 10f32.powf(-top_db / 20.0);
    let first = rms.iter().position(|&r| r > threshold);
    let last = rms.iter().rposition(|&r| r > threshold);
    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first * TRIM_HOP_LENGTH;
            let end = (last * TRIM_HOP_LENGTH + TRIM_FRAME_LENGTH).min(samples.len());
            samples[start..end].to_vec()
        }
        _ => samples.to_vec(),
    }
}

pub fn peak_normalize(mut samples: Vec<f32>, headroom: f32) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        let gain = headroom / peak;
        for s in &mut samples {
            *s *= gain;
        }
    }
    samples
}

fn overlapping_frame_rms(samples: &[f32], frame_length: usize, hop: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    if samples.len() <= frame_length {
        return vec![rms(samples)];
    }
    let n_frames = (samples.len() - frame_length) / hop + 1;
    let mut frames: Vec<f32> = (0..n_frames)
        .map(|i| rms(&samples[i * hop..i * hop + frame_length]))
        .collect();
    let covered = (n_frames - 1) * hop + frame_length;
    if covered < samples.len() {
        frames.push(rms(&samples[n_frames * hop..]));
    }
    frames
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|x| x * x).sum::<f32>() / frame.len() as f32).sqrt()
}
