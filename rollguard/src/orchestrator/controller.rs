//! Orchestration controller
//!
//! Drives one deployment run through publish, CI, health check and recovery.
//! Stages run strictly one after another and the target is never touched by
//! two stages at once. Every run ends with exactly one notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::deploy::fsm::{RunEvent, RunState};
use crate::deploy::{Publisher, Release};
use crate::errors::ControllerError;
use crate::health::{HealthProbe, ProbeSchedule};
use crate::models::health::{HealthReport, ProcessState};
use crate::models::run::{CausalTrail, DeploymentRun, FailureCause};
use crate::notify::{Notifier, Severity};
use crate::recovery::RecoveryEscalator;
use crate::workers::monitor::WorkflowMonitor;
use crate::workers::poller::CancelSignal;

/// Controller options
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Post-CI health check schedule
    pub schedule: ProbeSchedule,
}

/// What a finished run reports to its caller
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub revision: String,
    pub branch: String,
    pub state: RunState,
    pub history: Vec<RunState>,
    pub trail: CausalTrail,
    pub severity: Severity,
    pub notified: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

pub struct Controller {
    publisher: Arc<dyn Publisher>,
    monitor: Arc<WorkflowMonitor>,
    probe: Arc<dyn HealthProbe>,
    escalator: Arc<RecoveryEscalator>,
    release: Option<Arc<dyn Release>>,
    notifier: Arc<dyn Notifier>,
    options: ControllerOptions,
    busy: AtomicBool,
}

impl Controller {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        monitor: Arc<WorkflowMonitor>,
        probe: Arc<dyn HealthProbe>,
        escalator: Arc<RecoveryEscalator>,
        notifier: Arc<dyn Notifier>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            publisher,
            monitor,
            probe,
            escalator,
            release: None,
            notifier,
            options,
            busy: AtomicBool::new(false),
        }
    }

    /// Deploy from the controller once CI succeeds, instead of leaving it to the CI job
    pub fn with_release(mut self, release: Arc<dyn Release>) -> Self {
        self.release = Some(release);
        self
    }

    /// Run one deployment to a terminal state and send its notification.
    ///
    /// Rejects the call with `RunInProgress` while another run is active.
    pub async fn run(
        &self,
        revision: &str,
        branch: &str,
        cancel: &CancelSignal,
    ) -> Result<RunReport, ControllerError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ControllerError::RunInProgress);
        }

        let mut run = DeploymentRun::new(revision, branch);
        info!(run_id = %run.id, %revision, %branch, "Deployment run started");

        if let Err(e) = self.drive(&mut run, cancel).await {
            error!(run_id = %run.id, state = %run.status(), "Run aborted: {}", e);
            run.record_fatal(FailureCause::from(&e));
        }

        let report = self.finish(run).await;
        self.busy.store(false, Ordering::Release);
        Ok(report)
    }

    async fn drive(&self, run: &mut DeploymentRun, cancel: &CancelSignal) -> Result<(), ControllerError> {
        run.advance(RunEvent::Publish)?;
        if let Err(e) = self.publisher.publish(&run.revision, &run.branch).await {
            error!(run_id = %run.id, "Publish failed: {}", e);
            run.record_failure(FailureCause::from(&e));
            run.advance(RunEvent::PublishFailed)?;
            return Ok(());
        }
        run.advance(RunEvent::PublishAcked)?;

        let outcome = self.monitor.await_run(&run.revision, &run.branch, cancel).await;
        if let Some(cause) = FailureCause::from_ci(&outcome) {
            warn!(run_id = %run.id, "CI did not succeed: {}", cause);
            run.record_failure(cause);
            run.advance(RunEvent::CiFailed)?;
            return self.recover(run, None, cancel).await;
        }
        run.advance(RunEvent::CiSucceeded)?;

        if let Some(release) = &self.release {
            if let Err(e) = release.release(&run.revision, &run.branch).await {
                error!(run_id = %run.id, "Release failed: {}", e);
                run.record_failure(FailureCause::from(&e));
                run.advance(RunEvent::Unhealthy)?;
                if e.is_fatal() {
                    run.record_fatal(FailureCause::from(&e));
                    run.advance(RunEvent::RecoveryExhausted)?;
                    return Ok(());
                }
                return self.recover(run, None, cancel).await;
            }
        }

        let report = self.probe.probe_with_retry(&self.options.schedule, cancel).await;
        if report.is_healthy() {
            run.advance(RunEvent::Healthy)?;
            return Ok(());
        }

        let cause = if report.process_state == ProcessState::Unknown {
            FailureCause::HealthUnknown(report.summary())
        } else {
            FailureCause::Unhealthy(report.summary())
        };
        warn!(run_id = %run.id, "Post-deploy health check failed: {}", cause);
        run.record_failure(cause);
        run.advance(RunEvent::Unhealthy)?;
        self.recover(run, Some(&report), cancel).await
    }

    async fn recover(
        &self,
        run: &mut DeploymentRun,
        trigger: Option<&HealthReport>,
        cancel: &CancelSignal,
    ) -> Result<(), ControllerError> {
        match self.escalator.self_heal(run, trigger, cancel).await {
            Ok(Some(outcome)) => {
                run.record_tier(&outcome, outcome.health_after.summary());
                if outcome.succeeded {
                    run.advance(RunEvent::SelfHealSucceeded)?;
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => {
                run.record_fatal(FailureCause::from(&e));
                run.advance(RunEvent::RecoveryExhausted)?;
                return Ok(());
            }
        }

        if !self.escalator.options().rollback_enabled {
            run.record_fatal(FailureCause::RecoveryDisabled);
            run.advance(RunEvent::RecoveryExhausted)?;
            return Ok(());
        }
        run.advance(RunEvent::SelfHealFailed)?;

        match self.escalator.rollback(run, cancel).await {
            Ok(Some(outcome)) => {
                run.record_tier(&outcome, outcome.health_after.summary());
                if outcome.succeeded {
                    run.advance(RunEvent::RollbackSucceeded)?;
                } else {
                    run.record_fatal(FailureCause::RollbackUnhealthy(outcome.health_after.summary()));
                    run.advance(RunEvent::RecoveryExhausted)?;
                }
            }
            Ok(None) => {
                run.record_fatal(FailureCause::RecoveryDisabled);
                run.advance(RunEvent::RecoveryExhausted)?;
            }
            Err(e) => {
                run.record_fatal(FailureCause::from(&e));
                run.advance(RunEvent::RecoveryExhausted)?;
            }
        }
        Ok(())
    }

    async fn finish(&self, run: DeploymentRun) -> RunReport {
        let state = run.status();
        let short = short_revision(&run.revision);

        let (severity, title) = match (state, run.trail.resolved_by()) {
            (RunState::Succeeded, None) => (
                Severity::Success,
                format!("Deployed {} to {}", short, run.branch),
            ),
            (RunState::Succeeded, Some(tier)) => (
                Severity::Warning,
                format!("Deployment of {} recovered by {}", short, tier),
            ),
            _ => (
                Severity::Error,
                format!("Deployment of {} failed, manual action required", short),
            ),
        };

        let body = format!(
            "run: {}\nrevision: {}\nbranch: {}\nstate: {}\n{}",
            run.id,
            run.revision,
            run.branch,
            state,
            run.trail.render()
        );

        let notified = self.notifier.notify(severity, &title, &body).await;
        if !notified {
            warn!(run_id = %run.id, "Terminal notification was not delivered");
        }
        info!(run_id = %run.id, %state, %severity, "Deployment run finished");

        RunReport {
            run_id: run.id.clone(),
            revision: run.revision.clone(),
            branch: run.branch.clone(),
            state,
            history: run.history().to_vec(),
            trail: run.trail.clone(),
            severity,
            notified,
            started_at: run.started_at,
            finished_at: Utc::now(),
        }
    }
}

fn short_revision(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}
