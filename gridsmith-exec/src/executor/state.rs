use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Where a session is in the chunk loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Requesting,
    Validating,
    Correcting,
    Simulating,
    Executing,
    Reporting,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Validating => "validating",
            SessionState::Correcting => "correcting",
            SessionState::Simulating => "simulating",
            SessionState::Executing => "executing",
            SessionState::Reporting => "reporting",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    pub fn allowed_transitions(&self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            // Aborted directly from Idle is an early stop.
            Idle => &[Requesting, Aborted],
            // Reporting covers "completed", "no chunk" and generator errors.
            Requesting => &[Validating, Reporting],
            Validating => &[Correcting, Simulating],
            Correcting => &[Correcting, Simulating],
            Simulating => &[Executing],
            Executing => &[Reporting],
            Reporting => &[Requesting, Validating, Completed, Aborted],
            Completed | Aborted => &[],
        }
    }

    pub fn validate_transition(&self, to: SessionState) -> Result<(), OrchestratorError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(OrchestratorError::IllegalTransition { from: *self, to })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_only_reached_from_reporting() {
        let all = [
            SessionState::Idle,
            SessionState::Requesting,
            SessionState::Validating,
            SessionState::Correcting,
            SessionState::Simulating,
            SessionState::Executing,
            SessionState::Reporting,
            SessionState::Completed,
            SessionState::Aborted,
        ];
        for from in all {
            let reaches_completed = from.validate_transition(SessionState::Completed).is_ok();
            assert_eq!(reaches_completed, from == SessionState::Reporting, "{from}");
        }
        assert!(SessionState::Completed.allowed_transitions().is_empty());
    }

    #[test]
    fn skipping_the_sandbox_is_illegal() {
        assert!(matches!(
            SessionState::Validating.validate_transition(SessionState::Executing),
            Err(OrchestratorError::IllegalTransition { .. })
        ));
    }
}
