//! Fakes shared by the behaviour tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use rollguard::deploy::{Publisher, Release};
use rollguard::errors::ControllerError;
use rollguard::health::{HealthProbe, ProbeSchedule};
use rollguard::http::CiProvider;
use rollguard::models::health::{HealthReport, LogAnomaly, ProcessState, ResourceSummary};
use rollguard::models::snapshot::Snapshot;
use rollguard::models::workflow::{RunHandle, RunStatus};
use rollguard::notify::{Notifier, Severity};
use rollguard::recovery::{RecoveryActions, Remedy};
use rollguard::remote::{CommandOutput, RemoteExecutor};

/// Ordered record of side effects across fakes
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

pub fn healthy() -> HealthReport {
    HealthReport {
        observed_at: Utc::now(),
        process_state: ProcessState::Online,
        resources: ResourceSummary::default(),
        log_anomaly: None,
        probe_error: None,
    }
}

pub fn unhealthy() -> HealthReport {
    HealthReport {
        observed_at: Utc::now(),
        process_state: ProcessState::Offline,
        resources: ResourceSummary::default(),
        log_anomaly: None,
        probe_error: None,
    }
}

pub fn crashing(signature: &str) -> HealthReport {
    HealthReport {
        log_anomaly: Some(LogAnomaly {
            signature: signature.to_string(),
            line: "boom".to_string(),
        }),
        ..healthy()
    }
}

pub fn restarted(restart_count: u64) -> HealthReport {
    HealthReport {
        resources: ResourceSummary {
            restart_count: Some(restart_count),
            ..ResourceSummary::default()
        },
        ..healthy()
    }
}

pub fn fast_schedule(attempts: u32) -> ProbeSchedule {
    ProbeSchedule {
        attempts,
        interval: Duration::from_secs(1),
        warmup: Duration::ZERO,
        deadline: Duration::from_secs(120),
    }
}

pub fn output(exit_code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: if exit_code == 0 { String::new() } else { "failed".to_string() },
    }
}

// ================================ EXECUTOR ====================================== //

type Responder = Box<dyn Fn(&str) -> Result<CommandOutput, ControllerError> + Send + Sync>;

/// Records every command and answers through a closure
pub struct ScriptedExecutor {
    commands: Mutex<Vec<String>>,
    responder: Responder,
}

impl ScriptedExecutor {
    pub fn new(
        responder: impl Fn(&str) -> Result<CommandOutput, ControllerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn ok() -> Self {
        Self::new(|_| Ok(output(0, "")))
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn exec(&self, command: &str) -> Result<CommandOutput, ControllerError> {
        self.commands.lock().unwrap().push(command.to_string());
        (self.responder)(command)
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}

/// Executor that never answers within any sane timeout
pub struct HangingExecutor;

#[async_trait]
impl RemoteExecutor for HangingExecutor {
    async fn exec(&self, _command: &str) -> Result<CommandOutput, ControllerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(output(0, ""))
    }

    fn target(&self) -> String {
        "hanging".to_string()
    }
}

// ================================== PROBE ======================================= //

/// Plays back a script of reports; the last one repeats
pub struct FakeProbe {
    script: Mutex<VecDeque<HealthReport>>,
    journal: Journal,
    baseline: Option<u64>,
}

impl FakeProbe {
    pub fn new(script: Vec<HealthReport>, journal: Journal) -> Self {
        Self {
            script: Mutex::new(script.into()),
            journal,
            baseline: None,
        }
    }

    pub fn with_baseline(mut self, restart_count: u64) -> Self {
        self.baseline = Some(restart_count);
        self
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn restart_baseline(&self) -> Option<u64> {
        self.baseline
    }

    async fn probe(&self) -> HealthReport {
        let mut script = self.script.lock().unwrap();
        let report = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
        .unwrap_or_else(|| HealthReport::unknown("empty script"));
        self.journal
            .push(format!("probe:{}", if report.is_healthy() { "healthy" } else { "unhealthy" }));
        report
    }
}

// ================================= ACTIONS ====================================== //

pub struct FakeActions {
    journal: Journal,
    self_heal_fails: bool,
    backup_available: bool,
}

impl FakeActions {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            self_heal_fails: false,
            backup_available: true,
        }
    }

    pub fn without_backup(mut self) -> Self {
        self.backup_available = false;
        self
    }

    pub fn failing_self_heal(mut self) -> Self {
        self.self_heal_fails = true;
        self
    }
}

#[async_trait]
impl RecoveryActions for FakeActions {
    async fn self_heal(&self, remedy: Remedy) -> Result<(), ControllerError> {
        self.journal.push(format!("self_heal:{}", remedy));
        if self.self_heal_fails {
            return Err(ControllerError::Remote("ssh dropped".to_string()));
        }
        Ok(())
    }

    async fn restore_snapshot(&self) -> Result<Snapshot, ControllerError> {
        self.journal.push("restore");
        if !self.backup_available {
            return Err(ControllerError::NoBackupAvailable);
        }
        Ok(Snapshot {
            path: "/srv/app-backup".to_string(),
            taken_at: Utc::now(),
            source_revision: "abc1234".to_string(),
            replaced_by: Some("def5678".to_string()),
        })
    }

    async fn restart(&self) -> Result<(), ControllerError> {
        self.journal.push("restart");
        Ok(())
    }
}

// ================================ NOTIFIER ====================================== //

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(Severity, String, String)>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<(Severity, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, severity: Severity, title: &str, body: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((severity, title.to_string(), body.to_string()));
        true
    }
}

// ============================== CI / PUBLISHER ================================== //

/// CI provider that becomes visible after `hidden_polls` lookups and then
/// plays back a script of statuses
pub struct FakeCi {
    hidden_polls: Mutex<u32>,
    lookup_errors: Mutex<u32>,
    statuses: Mutex<VecDeque<RunStatus>>,
    pub lookups: Mutex<u32>,
    pub status_queries: Mutex<u32>,
}

impl FakeCi {
    pub fn new(hidden_polls: u32, statuses: Vec<RunStatus>) -> Self {
        Self {
            hidden_polls: Mutex::new(hidden_polls),
            lookup_errors: Mutex::new(0),
            statuses: Mutex::new(statuses.into()),
            lookups: Mutex::new(0),
            status_queries: Mutex::new(0),
        }
    }

    pub fn never_visible() -> Self {
        Self::new(u32::MAX, Vec::new())
    }

    pub fn with_lookup_errors(self, errors: u32) -> Self {
        *self.lookup_errors.lock().unwrap() = errors;
        self
    }

    pub fn succeeding() -> Self {
        Self::new(0, vec![completed("success", &[])])
    }

    pub fn failing(stage: &str) -> Self {
        Self::new(0, vec![completed("failure", &[stage])])
    }

    pub fn lookups(&self) -> u32 {
        *self.lookups.lock().unwrap()
    }
}

pub fn in_progress() -> RunStatus {
    RunStatus {
        status: "in_progress".to_string(),
        conclusion: None,
        failing_stages: Vec::new(),
    }
}

pub fn completed(conclusion: &str, failing: &[&str]) -> RunStatus {
    RunStatus {
        status: "completed".to_string(),
        conclusion: Some(conclusion.to_string()),
        failing_stages: failing.iter().map(|s| s.to_string()).collect(),
    }
}

#[async_trait]
impl CiProvider for FakeCi {
    async fn find_run(&self, branch: &str, revision: &str) -> Result<Option<RunHandle>, ControllerError> {
        *self.lookups.lock().unwrap() += 1;
        {
            let mut errors = self.lookup_errors.lock().unwrap();
            if *errors > 0 {
                *errors -= 1;
                return Err(ControllerError::ApiError("502 Bad Gateway".to_string()));
            }
        }
        let mut hidden = self.hidden_polls.lock().unwrap();
        if *hidden > 0 {
            *hidden -= 1;
            return Ok(None);
        }
        Ok(Some(RunHandle {
            id: 42,
            head_sha: revision.to_string(),
            head_branch: Some(branch.to_string()),
            html_url: None,
        }))
    }

    async fn run_status(&self, _run: &RunHandle) -> Result<RunStatus, ControllerError> {
        *self.status_queries.lock().unwrap() += 1;
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(in_progress))
    }
}

pub struct FakePublisher {
    pub fail: bool,
    pub journal: Journal,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, revision: &str, branch: &str) -> Result<(), ControllerError> {
        self.journal.push(format!("publish:{}:{}", revision, branch));
        if self.fail {
            return Err(ControllerError::Publish("unresolved conflicts in: main.py".to_string()));
        }
        Ok(())
    }
}

pub struct FakeRelease {
    pub result: Mutex<Option<ControllerError>>,
    pub journal: Journal,
}

#[async_trait]
impl Release for FakeRelease {
    async fn release(&self, revision: &str, _branch: &str) -> Result<Option<Snapshot>, ControllerError> {
        self.journal.push(format!("release:{}", revision));
        match self.result.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
