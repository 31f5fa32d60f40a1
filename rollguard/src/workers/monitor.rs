//! CI workflow monitor

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::http::workflows::CiProvider;
use crate::models::workflow::{CiOutcome, RunHandle, RUN_NOT_FOUND};
use crate::workers::poller::{CancelSignal, PollOptions, Poller, Tick};

/// Monitor options
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Grace delay before the first poll, so the run can be registered
    pub initial_delay: Duration,

    /// Polling interval
    pub interval: Duration,

    /// How long to wait for the run to show up at all
    pub discovery_window: Duration,

    /// Overall timeout for the run to finish
    pub timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(15),
            discovery_window: Duration::from_secs(120),
            timeout: Duration::from_secs(1800),
        }
    }
}

/// Waits for the CI run of a pushed revision to finish
pub struct WorkflowMonitor {
    provider: Arc<dyn CiProvider>,
    options: MonitorOptions,
}

impl WorkflowMonitor {
    pub fn new(provider: Arc<dyn CiProvider>, options: MonitorOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Poll until the run for `revision` reaches a terminal status.
    ///
    /// Provider errors are logged and retried on the next tick; they never
    /// end the wait on their own.
    pub async fn await_run(&self, revision: &str, branch: &str, cancel: &CancelSignal) -> CiOutcome {
        info!(%revision, %branch, timeout = ?self.options.timeout, "Waiting for CI run");

        let mut poller = Poller::new(
            PollOptions {
                initial_delay: self.options.initial_delay,
                interval: self.options.interval,
                max_attempts: None,
                deadline: self.options.timeout,
            },
            cancel.clone(),
        );
        let mut run: Option<RunHandle> = None;

        loop {
            let attempt = match poller.tick().await {
                Tick::Attempt(attempt) => attempt,
                Tick::Cancelled => {
                    info!("CI monitoring cancelled");
                    return CiOutcome::Cancelled;
                }
                Tick::TimedOut | Tick::Exhausted => {
                    warn!(elapsed = ?poller.elapsed(), "CI run did not finish in time");
                    return match run {
                        Some(_) => CiOutcome::TimedOut,
                        None => CiOutcome::Failure(RUN_NOT_FOUND.to_string()),
                    };
                }
            };

            let handle = match &run {
                Some(handle) => handle.clone(),
                None => match poller.bounded(self.provider.find_run(branch, revision)).await {
                    Some(Ok(Some(handle))) => {
                        info!(run_id = handle.id, url = ?handle.html_url, "CI run found");
                        run = Some(handle.clone());
                        handle
                    }
                    Some(Ok(None)) | Some(Err(_)) | None if poller.elapsed() >= self.options.discovery_window => {
                        warn!(window = ?self.options.discovery_window, "No CI run appeared for revision");
                        return CiOutcome::Failure(RUN_NOT_FOUND.to_string());
                    }
                    Some(Err(e)) => {
                        warn!(attempt, "CI run lookup failed: {}", e);
                        continue;
                    }
                    _ => {
                        debug!(attempt, "CI run not registered yet");
                        continue;
                    }
                },
            };

            let status = match poller.bounded(self.provider.run_status(&handle)).await {
                Some(Ok(status)) => status,
                Some(Err(e)) => {
                    warn!(attempt, run_id = handle.id, "CI status query failed: {}", e);
                    continue;
                }
                None => continue,
            };

            if !status.is_completed() {
                debug!(attempt, run_id = handle.id, status = %status.status, "CI run in progress");
                continue;
            }

            if status.is_success() {
                info!(run_id = handle.id, elapsed = ?poller.elapsed(), "CI run succeeded");
                return CiOutcome::Success;
            }

            let stage = status
                .failing_stages
                .first()
                .cloned()
                .or_else(|| status.conclusion.clone())
                .unwrap_or_else(|| "unknown".to_string());
            warn!(run_id = handle.id, %stage, conclusion = ?status.conclusion, "CI run failed");
            return CiOutcome::Failure(stage);
        }
    }
}
