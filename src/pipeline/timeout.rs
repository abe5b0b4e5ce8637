use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::embedding::EmbeddingMatrix;
use crate::error::AssessmentError;
use crate::pipeline::traits::{
    CharPosteriorModel, EmbeddingModel, TipProvider, TipRequest, Transcriber,
};
use crate::types::{CanonicalAudio, CtcPosteriors};

/// Runs `job` on a worker thread and waits at most `timeout` for it. With no
/// bound the job runs inline. A timed-out worker is detached; its result is
/// dropped when it eventually finishes.
pub(crate) fn run_with_timeout<T, F>(
    stage: &'static str,
    timeout: Option<Duration>,
    job: F,
) -> Result<T, AssessmentError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AssessmentError> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return job();
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name(format!("pronounce-{stage}"))
        .spawn(move || {
            // receiver may already be gone after a timeout
            let _ = tx.send(job());
        })
        .map_err(|e| AssessmentError::io("spawn inference worker", e))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(stage, timeout_ms = timeout.as_millis() as u64, "stage timed out");
            Err(AssessmentError::Timeout { stage, timeout })
        }
        Err(RecvTimeoutError::Disconnected) => Err(AssessmentError::runtime(
            "inference worker",
            format!("{stage} worker exited without a result"),
        )),
    }
}

/// Bounds every call of the wrapped capability by a per-stage timeout.
pub struct Timed<C: ?Sized> {
    inner: Arc<C>,
    timeout: Option<Duration>,
}

impl<C: ?Sized> Timed<C> {
    pub fn new(inner: Arc<C>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }
}

impl Transcriber for Timed<dyn Transcriber> {
    fn transcribe(&self, audio: &CanonicalAudio) -> Result<String, AssessmentError> {
        let inner = Arc::clone(&self.inner);
        let audio = audio.clone();
        run_with_timeout("transcription", self.timeout, move || {
            inner.transcribe(&audio)
        })
    }
}

impl CharPosteriorModel for Timed<dyn CharPosteriorModel> {
    fn char_posteriors(&self, audio: &CanonicalAudio) -> Result<CtcPosteriors, AssessmentError> {
        let inner = Arc::clone(&self.inner);
        let audio = audio.clone();
        run_with_timeout("alignment", self.timeout, move || {
            inner.char_posteriors(&audio)
        })
    }
}

impl EmbeddingModel for Timed<dyn EmbeddingModel> {
    fn embed(&self, audio: &CanonicalAudio) -> Result<EmbeddingMatrix, AssessmentError> {
        let inner = Arc::clone(&self.inner);
        let audio = audio.clone();
        run_with_timeout("embedding", self.timeout, move || inner.embed(&audio))
    }
}

impl TipProvider for Timed<dyn TipProvider> {
    fn phoneme_tips(
        &self,
        sentence: &str,
        weak: &[TipRequest],
    ) -> Result<Vec<String>, AssessmentError> {
        let inner = Arc::clone(&self.inner);
        let sentence = sentence.to_string();
        let weak = weak.to_vec();
        run_with_timeout("tips", self.timeout, move || {
            inner.phoneme_tips(&sentence, &weak)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowTranscriber(Duration);

    impl Transcriber for SlowTranscriber {
        fn transcribe(&self, _audio: &CanonicalAudio) -> Result<String, AssessmentError> {
            thread::sleep(self.0);
            Ok("hello".to_string())
        }
    }

    fn audio() -> CanonicalAudio {
        CanonicalAudio {
            samples: vec![0.0; 160],
            sample_rate_hz: 16_000,
        }
    }

    #[test]
    fn unbounded_runs_inline() {
        let value = run_with_timeout("test", None, || Ok(7)).expect("value");
        assert_eq!(value, 7);
    }

    #[test]
    fn fast_job_returns_its_result() {
        let inner: Arc<dyn Transcriber> = Arc::new(SlowTranscriber(Duration::from_millis(1)));
        let timed = Timed::new(inner, Some(Duration::from_secs(5)));
        assert_eq!(timed.transcribe(&audio()).expect("transcript"), "hello");
    }

    #[test]
    fn slow_job_times_out() {
        let inner: Arc<dyn Transcriber> = Arc::new(SlowTranscriber(Duration::from_millis(500)));
        let timed = Timed::new(inner, Some(Duration::from_millis(20)));
        let err = timed.transcribe(&audio()).expect_err("timeout");
        assert!(matches!(
            err,
            AssessmentError::Timeout {
                stage: "transcription",
                ..
            }
        ));
    }

    #[test]
    fn job_errors_pass_through() {
        let result: Result<(), _> = run_with_timeout("test", Some(Duration::from_secs(1)), || {
            Err(AssessmentError::invalid_audio("empty"))
        });
        assert_eq!(result.expect_err("error").code(), "invalid_audio");
    }
}
