use serde::Serialize;

use crate::error::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Cleaned,
    Verified,
    RejectedMismatch,
    Aligned,
    Embedded,
    Scored,
    RejectedUnscorable,
    MistakesDetected,
    Completed,
    /// A stage failed with an error (invalid audio, timeout, cancellation, ...).
    Failed,
    /// Models or reference data were unavailable and simulated mode is on.
    Simulated,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RejectedMismatch
                | Self::RejectedUnscorable
                | Self::Completed
                | Self::Failed
                | Self::Simulated
        )
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        use PipelineState::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Simulated => true,
            Cleaned => self == Received,
            Verified => self == Cleaned,
            RejectedMismatch | Aligned => self == Verified,
            Embedded => self == Aligned,
            Scored => self == Embedded,
            RejectedUnscorable | MistakesDetected => self == Scored,
            Completed => self == MistakesDetected,
            Received => false,
        }
    }
}

/// Forward-only record of the states one assessment passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageTrace {
    states: Vec<PipelineState>,
}

impl Default for StageTrace {
    fn default() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }
}

impl StageTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), AssessmentError> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(AssessmentError::runtime(
                "pipeline state",
                format!("illegal transition {current:?} -> {next:?}"),
            ));
        }
        tracing::debug!(from = ?current, to = ?next, "pipeline transition");
        self.states.push(next);
        Ok(())
    }

    /// Moves to a terminal state from wherever the pipeline stopped. Already
    /// terminal traces are left alone.
    pub(crate) fn terminate(&mut self, terminal: PipelineState) {
        if self.current().can_advance_to(terminal) {
            self.states.push(terminal);
        }
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn visited(&self, state: PipelineState) -> bool {
        self.states.contains(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn happy_path_is_accepted() {
        let mut trace = StageTrace::new();
        for next in [
            Cleaned,
            Verified,
            Aligned,
            Embedded,
            Scored,
            MistakesDetected,
            Completed,
        ] {
            trace.advance(next).expect("legal transition");
        }
        assert_eq!(trace.states().len(), 8);
        assert!(trace.current().is_terminal());
    }

    #[test]
    fn skipping_or_going_back_is_rejected() {
        let mut trace = StageTrace::new();
        assert!(trace.advance(Aligned).is_err());
        trace.advance(Cleaned).expect("cleaned");
        assert!(trace.advance(Received).is_err());
        assert!(trace.advance(Cleaned).is_err());
    }

    #[test]
    fn rejections_are_terminal() {
        let mut trace = StageTrace::new();
        trace.advance(Cleaned).expect("cleaned");
        trace.advance(Verified).expect("verified");
        trace.advance(RejectedMismatch).expect("rejected");
        assert!(trace.advance(Aligned).is_err());
        trace.terminate(Failed);
        assert_eq!(trace.current(), RejectedMismatch);
        assert!(!trace.visited(Aligned));
    }

    #[test]
    fn failure_reachable_from_any_open_state() {
        let mut trace = StageTrace::new();
        trace.advance(Cleaned).expect("cleaned");
        trace.terminate(Failed);
        assert_eq!(trace.current(), Failed);
    }

    #[test]
    fn serializes_as_list() {
        let mut trace = StageTrace::new();
        trace.advance(Cleaned).expect("cleaned");
        let json = serde_json::to_string(&trace).expect("json");
        assert_eq!(json, r#"["received","cleaned"]"#);
    }
}
