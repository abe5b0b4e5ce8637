mod aligner;
pub mod audio_boundaries;
pub mod distribute;
pub mod segments;
pub mod tokenization;
pub mod viterbi;
pub mod word_spans;

pub use aligner::{detect_speech_bounds, ForcedAligner, ProportionalAligner, WordBoundaryAligner};
