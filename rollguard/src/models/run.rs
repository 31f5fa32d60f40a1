//! Deployment run models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{RunEvent, RunFsm, RunState};
use crate::errors::{ControllerError, DeployStage};
use crate::models::recovery::{RecoveryOutcome, RecoveryTier};
use crate::models::workflow::{CiOutcome, RUN_NOT_FOUND};

/// Why a run left the happy path, or why it ended in failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    Publish(String),
    Discovery,
    CiFailure(String),
    CiTimedOut,
    Cancelled,
    Deploy { stage: DeployStage, message: String },
    Unhealthy(String),
    HealthUnknown(String),
    NoBackupAvailable,
    Backup(String),
    RollbackUnhealthy(String),
    RecoveryDisabled,
    Remote(String),
    Internal(String),
}

impl FailureCause {
    /// Cause for a non-success CI outcome
    pub fn from_ci(outcome: &CiOutcome) -> Option<Self> {
        match outcome {
            CiOutcome::Success => None,
            CiOutcome::Failure(stage) if stage == RUN_NOT_FOUND => Some(FailureCause::Discovery),
            CiOutcome::Failure(stage) => Some(FailureCause::CiFailure(stage.clone())),
            CiOutcome::TimedOut => Some(FailureCause::CiTimedOut),
            CiOutcome::Cancelled => Some(FailureCause::Cancelled),
        }
    }
}

impl From<&ControllerError> for FailureCause {
    fn from(err: &ControllerError) -> Self {
        match err {
            ControllerError::Publish(msg) => FailureCause::Publish(msg.clone()),
            ControllerError::Discovery(_) => FailureCause::Discovery,
            ControllerError::CiFailure(stage) => FailureCause::CiFailure(stage.clone()),
            ControllerError::Deploy { stage, message } => FailureCause::Deploy {
                stage: *stage,
                message: message.clone(),
            },
            ControllerError::NoBackupAvailable => FailureCause::NoBackupAvailable,
            ControllerError::Backup(msg) => FailureCause::Backup(msg.clone()),
            ControllerError::Cancelled => FailureCause::Cancelled,
            ControllerError::HealthUnknown(reason) => FailureCause::HealthUnknown(reason.clone()),
            ControllerError::Remote(msg) | ControllerError::Timeout(msg) => {
                FailureCause::Remote(msg.clone())
            }
            other => FailureCause::Internal(other.to_string()),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Publish(msg) => write!(f, "PublishError: {}", msg),
            FailureCause::Discovery => write!(f, "DiscoveryError: {}", RUN_NOT_FOUND),
            FailureCause::CiFailure(stage) => write!(f, "CIFailure: {}", stage),
            FailureCause::CiTimedOut => write!(f, "CIFailure: timed out"),
            FailureCause::Cancelled => write!(f, "Cancelled"),
            FailureCause::Deploy { stage, message } => {
                write!(f, "DeployError[{}]: {}", stage, message)
            }
            FailureCause::Unhealthy(summary) => write!(f, "Unhealthy: {}", summary),
            FailureCause::HealthUnknown(reason) => write!(f, "HealthUnknown: {}", reason),
            FailureCause::NoBackupAvailable => write!(f, "NoBackupAvailable"),
            FailureCause::Backup(msg) => write!(f, "BackupError: {}", msg),
            FailureCause::RollbackUnhealthy(summary) => {
                write!(f, "RollbackUnhealthy: {}", summary)
            }
            FailureCause::RecoveryDisabled => write!(f, "RecoveryDisabled"),
            FailureCause::Remote(msg) => write!(f, "RemoteError: {}", msg),
            FailureCause::Internal(msg) => write!(f, "InternalError: {}", msg),
        }
    }
}

/// One recovery tier as recorded in the trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRecord {
    pub tier: RecoveryTier,
    pub succeeded: bool,
    pub detail: String,
}

/// What went wrong and what fixed it, carried by the terminal notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalTrail {
    /// First failure that sent the run into recovery (or ended it)
    pub failure: Option<FailureCause>,

    /// Recovery tiers in the order they ran
    pub tiers: Vec<TierRecord>,

    /// Condition that ended recovery without success
    pub fatal: Option<FailureCause>,
}

impl CausalTrail {
    pub fn resolved_by(&self) -> Option<RecoveryTier> {
        self.tiers.iter().find(|t| t.succeeded).map(|t| t.tier)
    }

    /// Human-readable trail, one fact per line
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        match &self.failure {
            Some(cause) => lines.push(format!("failed: {}", cause)),
            None => lines.push("failed: nothing".to_string()),
        }
        for record in &self.tiers {
            let verdict = if record.succeeded { "succeeded" } else { "failed" };
            lines.push(format!("{}: {} ({})", record.tier, verdict, record.detail));
        }
        if let Some(fatal) = &self.fatal {
            lines.push(format!("fatal: {}", fatal));
        }
        if let Some(tier) = self.resolved_by() {
            lines.push(format!("resolved by: {}", tier));
        }
        lines.join("\n")
    }
}

/// One attempt to move the target to a new revision. Not persisted.
#[derive(Debug, Clone)]
pub struct DeploymentRun {
    pub id: String,
    pub revision: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
    pub attempts_recovery: u32,
    pub attempts_rollback: u32,
    pub trail: CausalTrail,
    fsm: RunFsm,
}

impl DeploymentRun {
    pub fn new(revision: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            revision: revision.into(),
            branch: branch.into(),
            started_at: Utc::now(),
            attempts_recovery: 0,
            attempts_rollback: 0,
            trail: CausalTrail::default(),
            fsm: RunFsm::new(),
        }
    }

    pub fn status(&self) -> RunState {
        self.fsm.state()
    }

    pub fn history(&self) -> &[RunState] {
        self.fsm.history()
    }

    /// Advance the run's state machine
    pub fn advance(&mut self, event: RunEvent) -> Result<RunState, ControllerError> {
        self.fsm.process(event).map_err(ControllerError::Internal)
    }

    /// Record the first failure; later failures belong to recovery records
    pub fn record_failure(&mut self, cause: FailureCause) {
        if self.trail.failure.is_none() {
            self.trail.failure = Some(cause);
        }
    }

    pub fn record_tier(&mut self, outcome: &RecoveryOutcome, detail: impl Into<String>) {
        self.trail.tiers.push(TierRecord {
            tier: outcome.tier,
            succeeded: outcome.succeeded,
            detail: detail.into(),
        });
    }

    pub fn record_fatal(&mut self, cause: FailureCause) {
        self.trail.fatal = Some(cause);
    }
}
