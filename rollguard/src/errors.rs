//! Error types for the deployment controller

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of a remote deploy, reported with every deploy failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStage {
    Stop,
    Transfer,
    Install,
    Restart,
}

impl DeployStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStage::Stop => "stop",
            DeployStage::Transfer => "transfer",
            DeployStage::Install => "install",
            DeployStage::Restart => "restart",
        }
    }
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CI API error: {0}")]
    ApiError(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("CI run for revision {0} never appeared")]
    Discovery(String),

    #[error("CI failed at stage: {0}")]
    CiFailure(String),

    #[error("Deploy failed at {stage}: {message}")]
    Deploy { stage: DeployStage, message: String },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("No backup available to restore")]
    NoBackupAvailable,

    #[error("Health unknown: {0}")]
    HealthUnknown(String),

    #[error("Remote execution error: {0}")]
    Remote(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Another deployment run is already in progress")]
    RunInProgress,

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    pub fn deploy(stage: DeployStage, message: impl Into<String>) -> Self {
        ControllerError::Deploy {
            stage,
            message: message.into(),
        }
    }

    /// Errors that leave nothing further to escalate to
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControllerError::NoBackupAvailable | ControllerError::Backup(_)
        )
    }
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        ControllerError::Internal(err.to_string())
    }
}
