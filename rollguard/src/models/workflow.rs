//! CI workflow run models

use serde::{Deserialize, Serialize};

/// Handle on one CI run, as discovered for a pushed revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// Provider run ID
    pub id: u64,

    /// Commit the run was triggered for
    pub head_sha: String,

    /// Branch the run was triggered on
    pub head_branch: Option<String>,

    /// Link for humans
    pub html_url: Option<String>,
}

/// Point-in-time status of a CI run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Provider status: queued, in_progress, completed, ...
    pub status: String,

    /// Provider conclusion once completed: success, failure, cancelled, ...
    pub conclusion: Option<String>,

    /// Names of the stages that failed, in job order
    pub failing_stages: Vec<String>,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_success(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }
}

/// Terminal result of awaiting a CI run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "stage", rename_all = "snake_case")]
pub enum CiOutcome {
    Success,
    Failure(String),
    TimedOut,
    Cancelled,
}

/// Stage name reported when no CI run shows up for the revision
pub const RUN_NOT_FOUND: &str = "run-not-found";
