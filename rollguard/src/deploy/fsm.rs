//! Finite State Machine for one deployment run

use std::fmt;

use serde::{Deserialize, Serialize};

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, publish not yet requested
    Pending,

    /// Pushing the revision
    Publishing,

    /// Waiting for the CI run to finish
    Monitoring,

    /// Probing the service after CI success
    HealthChecking,

    /// Self-heal tier in progress
    Recovering,

    /// Rollback tier in progress
    RollingBack,

    /// Terminal: service verified healthy
    Succeeded,

    /// Terminal: nothing further to escalate to
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Publishing => "publishing",
            RunState::Monitoring => "monitoring",
            RunState::HealthChecking => "health_checking",
            RunState::Recovering => "recovering",
            RunState::RollingBack => "rolling_back",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// A new revision is ready to publish
    Publish,

    /// The push was acknowledged
    PublishAcked,

    /// The push or its precondition failed
    PublishFailed,

    /// CI concluded with success
    CiSucceeded,

    /// CI failed, timed out, was cancelled or never appeared
    CiFailed,

    /// Post-deploy probe reached a healthy verdict
    Healthy,

    /// Post-deploy probe exhausted its attempts
    Unhealthy,

    /// Self-heal restored health
    SelfHealSucceeded,

    /// Self-heal failed or was skipped; move to rollback
    SelfHealFailed,

    /// Rollback restored health
    RollbackSucceeded,

    /// Rollback failed, or no further tier is enabled
    RecoveryExhausted,
}

/// Deployment run FSM.
///
/// Transitions only move forward; no run re-enters `Publishing`.
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    history: Vec<RunState>,
}

impl RunFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            history: vec![RunState::Pending],
        }
    }

    /// Get current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run has been in, oldest first
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<RunState, String> {
        let new_state = match (self.state, event) {
            (RunState::Pending, RunEvent::Publish) => RunState::Publishing,

            (RunState::Publishing, RunEvent::PublishAcked) => RunState::Monitoring,
            (RunState::Publishing, RunEvent::PublishFailed) => RunState::Failed,

            (RunState::Monitoring, RunEvent::CiSucceeded) => RunState::HealthChecking,
            (RunState::Monitoring, RunEvent::CiFailed) => RunState::Recovering,

            (RunState::HealthChecking, RunEvent::Healthy) => RunState::Succeeded,
            (RunState::HealthChecking, RunEvent::Unhealthy) => RunState::Recovering,

            (RunState::Recovering, RunEvent::SelfHealSucceeded) => RunState::Succeeded,
            (RunState::Recovering, RunEvent::SelfHealFailed) => RunState::RollingBack,
            (RunState::Recovering, RunEvent::RecoveryExhausted) => RunState::Failed,

            (RunState::RollingBack, RunEvent::RollbackSucceeded) => RunState::Succeeded,
            (RunState::RollingBack, RunEvent::RecoveryExhausted) => RunState::Failed,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
