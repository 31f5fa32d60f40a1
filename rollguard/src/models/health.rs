//! Health report models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process state as reported by the process supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Online,
    Offline,
    Unknown,
}

/// Derived verdict of a health report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
}

/// Resource usage of the service and its host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    /// Resident memory of the service in bytes
    pub memory_bytes: Option<u64>,

    /// CPU usage of the service (0-100 per core)
    pub cpu_percent: Option<f32>,

    /// Disk usage of the deployment filesystem (0-100)
    pub disk_percent: Option<f32>,

    /// Supervisor restart counter for the service
    pub restart_count: Option<u64>,
}

/// A fatal signature found in recent service logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnomaly {
    /// Signature name, e.g. `out-of-memory`
    pub signature: String,

    /// The log line that matched
    pub line: String,
}

/// Health verdict for one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub observed_at: DateTime<Utc>,
    pub process_state: ProcessState,
    pub resources: ResourceSummary,
    pub log_anomaly: Option<LogAnomaly>,

    /// Why the probe was inconclusive, when it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
}

impl HealthReport {
    /// Report for a probe that could not reach a conclusion
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            observed_at: Utc::now(),
            process_state: ProcessState::Unknown,
            resources: ResourceSummary::default(),
            log_anomaly: None,
            probe_error: Some(reason.into()),
        }
    }

    /// Healthy iff the process is online and no fatal log signature was seen.
    /// `Unknown` is never healthy.
    pub fn verdict(&self) -> HealthVerdict {
        if self.process_state == ProcessState::Online && self.log_anomaly.is_none() {
            HealthVerdict::Healthy
        } else {
            HealthVerdict::Unhealthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.verdict() == HealthVerdict::Healthy
    }

    /// One-line reason for an unhealthy verdict
    pub fn summary(&self) -> String {
        if let Some(err) = &self.probe_error {
            return format!("health unknown: {}", err);
        }
        match (&self.process_state, &self.log_anomaly) {
            (ProcessState::Online, None) => "healthy".to_string(),
            (ProcessState::Online, Some(anomaly)) => {
                format!("log anomaly: {}", anomaly.signature)
            }
            (state, Some(anomaly)) => format!(
                "process {}; log anomaly: {}",
                state_name(*state),
                anomaly.signature
            ),
            (state, None) => format!("process {}", state_name(*state)),
        }
    }
}

fn state_name(state: ProcessState) -> &'static str {
    match state {
        ProcessState::Online => "online",
        ProcessState::Offline => "offline",
        ProcessState::Unknown => "unknown",
    }
}
