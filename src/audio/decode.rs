use std::io::Cursor;
use std::path::Path;

use claxon::FlacReader;
use hound::{SampleFormat, WavReader};

use crate::error::AssessmentError;

/// Decoded PCM before any canonicalization. Samples are interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate_hz: u32,
}

impl RawAudio {
    pub fn mono(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate_hz,
        }
    }

    /// Averages interleaved channels into one.
    pub fn downmix(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(channels)
            .filter(|frame| frame.len() == channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

pub fn read_audio_file(path: &Path) -> Result<RawAudio, AssessmentError> {
    let bytes = std::fs::read(path).map_err(|e| AssessmentError::io("read audio file", e))?;
    decode_audio(&bytes)
}

/// Decodes WAV or FLAC bytes, sniffing the container from its magic number.
pub fn decode_audio(bytes: &[u8]) -> Result<RawAudio, AssessmentError> {
    if bytes.starts_with(b"RIFF") || bytes.starts_with(b"RIFX") {
        decode_wav(bytes)
    } else if bytes.starts_with(b"fLaC") {
        decode_flac(bytes)
    } else if bytes.is_empty() {
        Err(AssessmentError::invalid_audio("empty upload"))
    } else {
        Err(AssessmentError::invalid_audio(
            "unrecognized container; expected WAV or FLAC",
        ))
    }
}

fn decode_wav(bytes: &[u8]) -> Result<RawAudio, AssessmentError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| AssessmentError::invalid_audio(format!("WAV header: {e}")))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AssessmentError::invalid_audio("WAV has zero channels"));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AssessmentError::invalid_audio(format!("WAV float samples: {e}")))?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AssessmentError::invalid_audio(format!("WAV int samples: {e}")))?
        }
    };

    Ok(RawAudio {
        samples,
        channels: spec.channels,
        sample_rate_hz: spec.sample_rate,
    })
}

fn decode_flac(bytes: &[u8]) -> Result<RawAudio, AssessmentError> {
    let mut reader = FlacReader::new(Cursor::new(bytes))
        .map_err(|e| AssessmentError::invalid_audio(format!("FLAC header: {e}")))?;
    let streaminfo = reader.streaminfo();
    if streaminfo.channels == 0 {
        return Err(AssessmentError::invalid_audio("FLAC has zero channels"));
    }
    let scale = int_scale(streaminfo.bits_per_sample);

    let mut samples = Vec::new();
    for sample in reader.samples() {
        let sample =
            sample.map_err(|e| AssessmentError::invalid_audio(format!("FLAC samples: {e}")))?;
        samples.push(sample as f32 / scale);
    }

    Ok(RawAudio {
        samples,
        channels: streaminfo.channels as u16,
        sample_rate_hz: streaminfo.sample_rate,
    })
}

fn int_scale(bits_per_sample: u32) -> f32 {
    if bits_per_sample > 1 {
        ((1_i64 << (bits_per_sample - 1)) - 1) as f32
    } else {
        1.0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
            for &s in samples {
                writer.write_sample(s).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_int16_wav() {
        let bytes = wav_bytes(&[0, 16_384, -16_384, 32_767], 1, 8_000);
        let audio = decode_audio(&bytes).expect("decode");
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.sample_rate_hz, 8_000);
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
        assert!((audio.samples[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        let bytes = wav_bytes(&[32_767, 0, 0, -32_767], 2, 16_000);
        let audio = decode_audio(&bytes).expect("decode");
        let mono = audio.downmix();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-4);
        assert!((mono[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        let err = decode_audio(b"not audio at all").expect_err("garbage must fail");
        assert!(matches!(err, AssessmentError::InvalidAudio { .. }));
        let err = decode_audio(&[]).expect_err("empty must fail");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_truncated_wav() {
        let bytes = wav_bytes(&[1, 2, 3, 4], 1, 16_000);
        let err = decode_audio(&bytes[..20]).expect_err("truncated header must fail");
        assert_eq!(err.code(), "invalid_audio");
    }

    #[test]
    fn rejects_truncated_flac() {
        let err = decode_audio(b"fLaC\0\0").expect_err("truncated flac must fail");
        assert_eq!(err.code(), "invalid_audio");
    }
}
