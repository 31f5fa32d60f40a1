//! Two-tier recovery escalation
//!
//! Self-heal always comes first and rollback only after it. Each tier runs
//! at most once per deployment run; the attempt counters live on the run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::errors::ControllerError;
use crate::health::{HealthProbe, ProbeSchedule};
use crate::models::health::HealthReport;
use crate::models::recovery::{RecoveryOutcome, RecoveryTier};
use crate::models::run::DeploymentRun;
use crate::recovery::actions::RecoveryActions;
use crate::recovery::remedy::Remedy;
use crate::workers::poller::CancelSignal;

/// Escalator options
#[derive(Debug, Clone)]
pub struct EscalatorOptions {
    pub self_heal_enabled: bool,
    pub rollback_enabled: bool,

    /// Probe schedule after each tier
    pub schedule: ProbeSchedule,
}

impl Default for EscalatorOptions {
    fn default() -> Self {
        Self {
            self_heal_enabled: true,
            rollback_enabled: true,
            schedule: ProbeSchedule::default(),
        }
    }
}

pub struct RecoveryEscalator {
    actions: Arc<dyn RecoveryActions>,
    probe: Arc<dyn HealthProbe>,
    options: EscalatorOptions,
}

impl RecoveryEscalator {
    pub fn new(
        actions: Arc<dyn RecoveryActions>,
        probe: Arc<dyn HealthProbe>,
        options: EscalatorOptions,
    ) -> Self {
        Self {
            actions,
            probe,
            options,
        }
    }

    pub fn options(&self) -> &EscalatorOptions {
        &self.options
    }

    /// Run the self-heal tier.
    ///
    /// Returns `Ok(None)` when the tier is disabled. A remediation error is
    /// not returned: it becomes an unsuccessful outcome so rollback can follow.
    pub async fn self_heal(
        &self,
        run: &mut DeploymentRun,
        trigger: Option<&HealthReport>,
        cancel: &CancelSignal,
    ) -> Result<Option<RecoveryOutcome>, ControllerError> {
        if !self.options.self_heal_enabled {
            info!(run_id = %run.id, "Self-heal disabled, skipping");
            return Ok(None);
        }
        if run.attempts_recovery > 0 {
            return Err(ControllerError::Internal(
                "self-heal already attempted for this run".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }
        run.attempts_recovery += 1;

        let remedy = Remedy::for_anomaly(trigger.and_then(|r| r.log_anomaly.as_ref()));
        info!(run_id = %run.id, %remedy, "Self-heal started");

        let health_after = match self.actions.self_heal(remedy).await {
            Ok(()) => self.probe.probe_with_retry(&self.options.schedule, cancel).await,
            Err(e) => {
                warn!(run_id = %run.id, "Self-heal remediation failed: {}", e);
                HealthReport::unknown(format!("self-heal failed: {}", e))
            }
        };

        let succeeded = health_after.is_healthy();
        info!(run_id = %run.id, succeeded, "Self-heal finished");
        Ok(Some(RecoveryOutcome {
            tier: RecoveryTier::SelfHeal,
            succeeded,
            health_after,
        }))
    }

    /// Run the rollback tier.
    ///
    /// `NoBackupAvailable` and other backup errors are returned as errors:
    /// there is nothing left to escalate to. Returns `Ok(None)` when disabled.
    pub async fn rollback(
        &self,
        run: &mut DeploymentRun,
        cancel: &CancelSignal,
    ) -> Result<Option<RecoveryOutcome>, ControllerError> {
        if !self.options.rollback_enabled {
            info!(run_id = %run.id, "Rollback disabled, skipping");
            return Ok(None);
        }
        if run.attempts_rollback > 0 {
            return Err(ControllerError::Internal(
                "rollback already attempted for this run".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }
        run.attempts_rollback += 1;

        info!(run_id = %run.id, "Rollback started");
        let snapshot = self.actions.restore_snapshot().await.map_err(|e| {
            error!(run_id = %run.id, "Restore failed: {}", e);
            e
        })?;
        info!(run_id = %run.id, revision = %snapshot.source_revision, "Previous revision restored");

        let health_after = match self.actions.restart().await {
            Ok(()) => self.probe.probe_with_retry(&self.options.schedule, cancel).await,
            Err(e) => {
                error!(run_id = %run.id, "Restart of restored tree failed: {}", e);
                HealthReport::unknown(format!("restart after restore failed: {}", e))
            }
        };

        let succeeded = health_after.is_healthy();
        info!(run_id = %run.id, succeeded, "Rollback finished");
        Ok(Some(RecoveryOutcome {
            tier: RecoveryTier::Rollback,
            succeeded,
            health_after,
        }))
    }
}
