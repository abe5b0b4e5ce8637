mod matcher;
mod verifier;
mod word_diff;

pub use matcher::{char_ratio, OpTag, Opcode, SequenceMatcher};
pub use verifier::{SpeechVerifier, VerificationResult, VerificationStatus};
pub(crate) use verifier::round3;
pub use word_diff::{word_diff, WordDiffEntry, WordDiffKind, WordIssue};
