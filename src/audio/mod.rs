mod decode;
mod preprocess;

pub use decode::{decode_audio, read_audio_file, RawAudio};
pub use preprocess::{peak_normalize, resample, trim_silence, AudioPreprocessor};

#[cfg(test)]
pub(crate) use decode::tests::wav_bytes;
