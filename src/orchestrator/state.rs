//! Controller state machine data.
//!
//! `ControllerState` is the lifecycle enum of a build run; transitions are
//! validated against a fixed table so an out-of-order control request is a
//! rejected no-op rather than a corrupted run.

use serde::{Deserialize, Serialize};

/// Lifecycle states of the build controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// No run active. The only state that accepts `start`.
    Idle,
    /// The build loop is executing cells.
    Running,
    /// The loop is parked at a yield point awaiting `resume` or `stop`.
    Paused,
    /// A stop was requested; the loop is winding down cooperatively.
    Stopping,
    /// The loop is abandoning the in-flight cell and reloading the
    /// checkpoint after an externally detected fault.
    Recovering,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Running => "running",
            ControllerState::Paused => "paused",
            ControllerState::Stopping => "stopping",
            ControllerState::Recovering => "recovering",
        }
    }

    /// All valid transitions FROM this state.
    pub fn valid_next_states(&self) -> Vec<ControllerState> {
        match self {
            ControllerState::Idle => vec![ControllerState::Running],
            ControllerState::Running => vec![
                ControllerState::Paused,
                ControllerState::Stopping,
                ControllerState::Recovering,
                ControllerState::Idle,
            ],
            ControllerState::Paused => vec![
                ControllerState::Running,
                ControllerState::Stopping,
                ControllerState::Recovering,
            ],
            ControllerState::Stopping => vec![ControllerState::Idle],
            ControllerState::Recovering => vec![ControllerState::Running],
        }
    }

    pub fn can_transition_to(&self, next: ControllerState) -> bool {
        self.valid_next_states().contains(&next)
    }

    /// A run is in progress (possibly paused or winding down).
    pub fn is_active(&self) -> bool {
        !matches!(self, ControllerState::Idle)
    }
}

/// Terminal status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Stopped,
    Error,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped => "stopped",
            RunOutcome::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_accepts_start() {
        assert!(ControllerState::Idle.can_transition_to(ControllerState::Running));
        assert!(!ControllerState::Stopping.can_transition_to(ControllerState::Running));
    }

    #[test]
    fn test_pause_resume_cycle() {
        assert!(ControllerState::Running.can_transition_to(ControllerState::Paused));
        assert!(ControllerState::Paused.can_transition_to(ControllerState::Running));
        assert!(!ControllerState::Idle.can_transition_to(ControllerState::Paused));
    }

    #[test]
    fn test_recovery_returns_to_running() {
        assert!(ControllerState::Paused.can_transition_to(ControllerState::Recovering));
        assert!(ControllerState::Recovering.can_transition_to(ControllerState::Running));
        assert!(!ControllerState::Recovering.can_transition_to(ControllerState::Idle));
    }

    #[test]
    fn test_stopping_only_settles_to_idle() {
        assert_eq!(
            ControllerState::Stopping.valid_next_states(),
            vec![ControllerState::Idle]
        );
    }
}
