//! Terminal notifications
//!
//! Delivery is best-effort: a failed delivery is logged and reported as
//! `false`, never raised.

pub mod discord;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use discord::DiscordNotifier;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification. Returns whether it was delivered.
    async fn notify(&self, severity: Severity, title: &str, body: &str) -> bool;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, severity: Severity, title: &str, body: &str) -> bool {
        match severity {
            Severity::Success => info!(%severity, "{}\n{}", title, body),
            Severity::Warning => warn!(%severity, "{}\n{}", title, body),
            Severity::Error => error!(%severity, "{}\n{}", title, body),
        }
        true
    }
}
