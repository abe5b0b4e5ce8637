use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AssessmentError;

/// Cooperative cancellation shared between a caller and one assessment.
/// Checked between stages; an in-flight inference call is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self, stage: &'static str) -> Result<(), AssessmentError> {
        if self.is_cancelled() {
            tracing::debug!(stage, "assessment cancelled");
            return Err(AssessmentError::Cancelled { stage });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(flag.check("alignment").is_ok());
        handle.cancel();
        assert!(flag.is_cancelled());
        let err = flag.check("alignment").expect_err("cancelled");
        assert_eq!(err.code(), "cancelled");
        assert_eq!(err.to_string(), "assessment cancelled before alignment");
    }
}
