//! Command handlers

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::state::AppState;
use crate::deploy::Release;
use crate::errors::ControllerError;
use crate::health::HealthProbe;
use crate::models::health::HealthReport;
use crate::models::recovery::RecoveryOutcome;
use crate::models::run::{DeploymentRun, FailureCause};
use crate::models::snapshot::Snapshot;
use crate::models::workflow::CiOutcome;
use crate::notify::Severity;
use crate::orchestrator::RunReport;
use crate::workers::poller::{cancellation, CancelSignal};

/// Turn a shutdown future into a cancellation signal.
///
/// The returned task fires the signal once `shutdown` resolves; abort it
/// when the command is done.
pub fn cancel_on(
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> (CancelSignal, JoinHandle<()>) {
    let (handle, signal) = cancellation();
    let task = tokio::spawn(async move {
        shutdown.await;
        info!("Cancellation requested, stopping at the next safe point");
        handle.cancel();
    });
    (signal, task)
}

/// Full SHA of `revision`, or of `HEAD` when none was given. CI lookups match
/// on the full SHA, so abbreviated input is always expanded.
async fn resolve_revision(state: &AppState, revision: Option<String>) -> Result<String, ControllerError> {
    let revision = revision.unwrap_or_else(|| "HEAD".to_string());
    state.publisher.resolve(&revision).await
}

fn branch_or_default(state: &AppState, branch: Option<String>) -> String {
    branch.unwrap_or_else(|| state.options.default_branch.clone())
}

/// Full pipeline: publish, CI, health check, recovery, one notification
pub async fn run_pipeline(
    state: &AppState,
    revision: Option<String>,
    branch: Option<String>,
    cancel: &CancelSignal,
) -> Result<RunReport, ControllerError> {
    let revision = resolve_revision(state, revision).await?;
    let branch = branch_or_default(state, branch);
    state.controller.run(&revision, &branch, cancel).await
}

/// Release step run by the CI job: snapshot then deploy
pub async fn deploy(
    state: &AppState,
    revision: Option<String>,
    branch: Option<String>,
) -> Result<Option<Snapshot>, ControllerError> {
    let revision = resolve_revision(state, revision).await?;
    let branch = branch_or_default(state, branch);
    state.deployer.release(&revision, &branch).await
}

/// Probe until healthy or out of attempts
pub async fn health(state: &AppState, cancel: &CancelSignal) -> HealthReport {
    state
        .prober
        .probe_with_retry(&state.options.schedule, cancel)
        .await
}

/// Wait for the CI run of a revision
pub async fn monitor(
    state: &AppState,
    revision: Option<String>,
    branch: Option<String>,
    cancel: &CancelSignal,
) -> Result<CiOutcome, ControllerError> {
    let revision = resolve_revision(state, revision).await?;
    let branch = branch_or_default(state, branch);
    Ok(state.monitor.await_run(&revision, &branch, cancel).await)
}

/// Rollback tier on its own, with one notification
pub async fn rollback(
    state: &AppState,
    cancel: &CancelSignal,
) -> Result<RecoveryOutcome, ControllerError> {
    let mut run = DeploymentRun::new("previous", state.options.default_branch.clone());
    let result = match state.escalator.rollback(&mut run, cancel).await {
        Ok(Some(outcome)) => Ok(outcome),
        Ok(None) => Err(ControllerError::ConfigError(
            "rollback is disabled in settings".to_string(),
        )),
        Err(e) => Err(e),
    };

    let (severity, title, body) = match &result {
        Ok(outcome) if outcome.succeeded => (
            Severity::Warning,
            "Manual rollback restored the previous deployment".to_string(),
            outcome.health_after.summary(),
        ),
        Ok(outcome) => (
            Severity::Error,
            "Manual rollback finished unhealthy".to_string(),
            FailureCause::RollbackUnhealthy(outcome.health_after.summary()).to_string(),
        ),
        Err(e) => (
            Severity::Error,
            "Manual rollback failed".to_string(),
            FailureCause::from(e).to_string(),
        ),
    };
    if !state.notifier.notify(severity, &title, &body).await {
        error!("Rollback notification was not delivered");
    }

    result
}
