//! Retry Gate
//!
//! Decides, after every execution, whether the request loops back to
//! interpretation or moves on to the response. The cap bounds the number of
//! failed passes, so a request finishes in at most `cap + 1` passes whatever
//! the model does.

use crate::state::RequestState;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    NeedsRetry,
    Terminal,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryGate {
    cap: u32,
}

impl RetryGate {
    /// A cap below 1 is raised to 1; the first pass always counts.
    pub fn new(cap: u32) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn decide(&self, state: &RequestState) -> GateDecision {
        if state.query_result().is_some() {
            return GateDecision::Terminal;
        }
        if state.loop_count() < self.cap {
            return GateDecision::NeedsRetry;
        }

        warn!(
            recovery = "RetryExhausted",
            loop_count = state.loop_count(),
            cap = self.cap,
            error = state.error().unwrap_or_default(),
            "Retry limit reached"
        );
        GateDecision::Terminal
    }
}

impl Default for RetryGate {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed_times(n: u32) -> RequestState {
        (0..n).fold(RequestState::new("q"), |state, i| {
            state.with_execution_error(format!("failure {}", i + 1))
        })
    }

    #[test]
    fn test_result_is_terminal_regardless_of_loop_count() {
        let gate = RetryGate::default();
        for n in [0, 4, 5] {
            let state = failed_times(n).with_query_result(vec![json!({"a": 1}).as_object().cloned().unwrap()]);
            assert_eq!(gate.decide(&state), GateDecision::Terminal);
        }
    }

    #[test]
    fn test_below_cap_retries() {
        let gate = RetryGate::default();
        assert_eq!(gate.decide(&failed_times(1)), GateDecision::NeedsRetry);
        assert_eq!(gate.decide(&failed_times(4)), GateDecision::NeedsRetry);
    }

    #[test]
    fn test_at_cap_is_terminal_and_keeps_error() {
        let gate = RetryGate::default();
        let state = failed_times(5);
        assert_eq!(gate.decide(&state), GateDecision::Terminal);
        assert_eq!(state.error(), Some("failure 5"));
    }

    #[test]
    fn test_cap_of_one_stops_after_first_failure() {
        let gate = RetryGate::new(1);
        assert_eq!(gate.decide(&failed_times(1)), GateDecision::Terminal);
        assert_eq!(gate.decide(&failed_times(0)), GateDecision::NeedsRetry);
        assert_eq!(RetryGate::new(0).cap(), 1);
    }
}
