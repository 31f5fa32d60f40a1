//! Recovery models

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::health::HealthReport;

/// Escalation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTier {
    SelfHeal,
    Rollback,
}

impl fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryTier::SelfHeal => f.write_str("self-heal"),
            RecoveryTier::Rollback => f.write_str("rollback"),
        }
    }
}

/// Result of one escalation tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub tier: RecoveryTier,
    pub succeeded: bool,
    pub health_after: HealthReport,
}
