//! Health prober
//!
//! A probe reads three things from the target: the supervisor's view of the
//! process, the recent log window, and disk usage. Anything inconclusive
//! yields `ProcessState::Unknown`, which is never healthy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::deploy::pm2;
use crate::health::signatures::{SignatureSet, CRASH_LOOP};
use crate::models::health::{HealthReport, LogAnomaly, ProcessState, ResourceSummary};
use crate::remote::RemoteExecutor;
use crate::workers::poller::{CancelSignal, PollOptions, Poller, Tick};

/// Retry schedule for `probe_with_retry`
#[derive(Debug, Clone)]
pub struct ProbeSchedule {
    /// Maximum number of probes
    pub attempts: u32,

    /// Delay between probes
    pub interval: Duration,

    /// Delay before the first probe, to let the service warm up
    pub warmup: Duration,

    /// Overall budget for all probes
    pub deadline: Duration,
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(30),
            warmup: Duration::from_secs(10),
            deadline: Duration::from_secs(360),
        }
    }
}

/// Anything that can produce a health report
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// One bounded check. Never blocks indefinitely and never fails: an
    /// inconclusive check is reported as `Unknown`.
    async fn probe(&self) -> HealthReport;

    /// Supervisor restart counter before probing starts, when it can be read
    async fn restart_baseline(&self) -> Option<u64> {
        None
    }

    /// Probe up to `schedule.attempts` times, stopping at the first healthy
    /// report. Returns the last report when none was healthy.
    ///
    /// A restart counter that grew since the previous reading marks the report
    /// as a crash loop, even when the process is online at that moment.
    async fn probe_with_retry(
        &self,
        schedule: &ProbeSchedule,
        cancel: &CancelSignal,
    ) -> HealthReport {
        let mut poller = Poller::new(
            PollOptions {
                initial_delay: schedule.warmup,
                interval: schedule.interval,
                max_attempts: Some(schedule.attempts),
                deadline: schedule.deadline,
            },
            cancel.clone(),
        );

        let mut restarts = if cancel.is_cancelled() {
            None
        } else {
            poller.bounded(self.restart_baseline()).await.flatten()
        };
        let mut last: Option<HealthReport> = None;
        loop {
            match poller.tick().await {
                Tick::Attempt(attempt) => {
                    let mut report = poller
                        .bounded(self.probe())
                        .await
                        .unwrap_or_else(|| HealthReport::unknown("probe deadline exceeded"));
                    restarts = flag_restart_growth(&mut report, restarts);
                    if report.is_healthy() {
                        info!(attempt, "Service healthy");
                        return report;
                    }
                    warn!(attempt, max = schedule.attempts, "Service unhealthy: {}", report.summary());
                    last = Some(report);
                }
                Tick::Exhausted => break,
                Tick::TimedOut => {
                    warn!("Health probing ran out of time");
                    break;
                }
                Tick::Cancelled => {
                    info!("Health probing cancelled");
                    break;
                }
            }
        }

        last.unwrap_or_else(|| HealthReport::unknown("no probe completed"))
    }
}

/// Mark `report` as a crash loop when its restart counter is above `previous`.
/// Returns the reading to compare the next report against.
pub fn flag_restart_growth(report: &mut HealthReport, previous: Option<u64>) -> Option<u64> {
    let Some(current) = report.resources.restart_count else {
        return previous;
    };
    if let Some(previous) = previous.filter(|p| current > *p) {
        if report.log_anomaly.is_none() {
            report.log_anomaly = Some(LogAnomaly {
                signature: CRASH_LOOP.to_string(),
                line: format!("restart count grew from {} to {}", previous, current),
            });
        }
    }
    Some(current)
}

#[derive(Debug, Deserialize)]
struct Pm2Process {
    name: String,
    #[serde(default)]
    pm2_env: Pm2Env,
    #[serde(default)]
    monit: Pm2Monit,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Env {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    restart_time: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Monit {
    #[serde(default)]
    memory: Option<u64>,
    #[serde(default)]
    cpu: Option<f32>,
}

/// Probes a PM2-supervised service on the target
pub struct HealthProber {
    exec: Arc<dyn RemoteExecutor>,
    app_name: String,
    deploy_path: String,
    log_lines: u32,
    probe_timeout: Duration,
    signatures: SignatureSet,
}

impl HealthProber {
    pub fn new(
        exec: Arc<dyn RemoteExecutor>,
        app_name: impl Into<String>,
        deploy_path: impl Into<String>,
        log_lines: u32,
        probe_timeout: Duration,
        signatures: SignatureSet,
    ) -> Self {
        Self {
            exec,
            app_name: app_name.into(),
            deploy_path: deploy_path.into(),
            log_lines,
            probe_timeout,
            signatures,
        }
    }

    async fn probe_inner(&self) -> HealthReport {
        let (process, logs, disk) = futures::future::join3(
            self.exec.exec(&pm2::jlist()),
            self.exec.exec(&pm2::logs(&self.app_name, self.log_lines)),
            self.exec.exec(&pm2::disk_usage(&self.deploy_path)),
        )
        .await;

        let process = match process {
            Ok(out) if out.success() => out,
            Ok(out) => {
                return HealthReport::unknown(format!("pm2 jlist failed: {}", out.failure_message()))
            }
            Err(e) => return HealthReport::unknown(e.to_string()),
        };
        let (process_state, mut resources) = match parse_jlist(&process.stdout, &self.app_name) {
            Ok(parsed) => parsed,
            Err(e) => return HealthReport::unknown(e),
        };

        let logs = match logs {
            Ok(out) if out.success() => out.stdout,
            Ok(out) => {
                return HealthReport::unknown(format!("reading logs failed: {}", out.failure_message()))
            }
            Err(e) => return HealthReport::unknown(e.to_string()),
        };

        resources.disk_percent = match disk {
            Ok(out) if out.success() => parse_disk_percent(&out.stdout),
            _ => None,
        };

        HealthReport {
            observed_at: Utc::now(),
            process_state,
            resources,
            log_anomaly: self.signatures.classify(&logs),
            probe_error: None,
        }
    }
}

#[async_trait]
impl HealthProbe for HealthProber {
    async fn restart_baseline(&self) -> Option<u64> {
        let output = tokio::time::timeout(self.probe_timeout, self.exec.exec(&pm2::jlist()))
            .await
            .ok()?
            .ok()
            .filter(|out| out.success())?;
        parse_jlist(&output.stdout, &self.app_name)
            .ok()
            .and_then(|(_, resources)| resources.restart_count)
    }

    async fn probe(&self) -> HealthReport {
        debug!(app = %self.app_name, target = %self.exec.target(), "Probing service health");
        match tokio::time::timeout(self.probe_timeout, self.probe_inner()).await {
            Ok(report) => report,
            Err(_) => HealthReport::unknown(format!(
                "probe timed out after {:?}",
                self.probe_timeout
            )),
        }
    }
}

/// Extract the app's state from `pm2 jlist` output.
///
/// PM2 may print notices before the JSON array; those are skipped.
pub fn parse_jlist(stdout: &str, app_name: &str) -> Result<(ProcessState, ResourceSummary), String> {
    let start = stdout
        .find('[')
        .ok_or_else(|| "pm2 jlist printed no process list".to_string())?;
    let processes: Vec<Pm2Process> = serde_json::from_str(stdout[start..].trim_end())
        .map_err(|e| format!("unparseable pm2 jlist output: {}", e))?;

    let Some(process) = processes.into_iter().find(|p| p.name == app_name) else {
        return Ok((ProcessState::Offline, ResourceSummary::default()));
    };

    let state = match process.pm2_env.status.as_deref() {
        Some("online") => ProcessState::Online,
        Some(_) => ProcessState::Offline,
        None => ProcessState::Unknown,
    };
    let resources = ResourceSummary {
        memory_bytes: process.monit.memory,
        cpu_percent: process.monit.cpu,
        disk_percent: None,
        restart_count: process.pm2_env.restart_time,
    };
    Ok((state, resources))
}

fn parse_disk_percent(stdout: &str) -> Option<f32> {
    stdout.trim().trim_end_matches('%').parse().ok()
}
