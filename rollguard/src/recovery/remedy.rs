//! Self-heal remedies

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::health::LogAnomaly;
use crate::utils::shell_quote;

/// Targeted fix applied before the self-heal restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Remedy {
    /// Re-run the dependency install
    Reinstall,

    /// Empty the log files of every supervised app
    FlushLogs,

    /// Drop SQLite write-ahead sidecars of preserved databases
    ClearDatabaseLocks,

    /// Give the deploy user back ownership of the live tree
    FixPermissions,

    /// Nothing beyond the restart itself
    Restart,
}

impl Remedy {
    /// Pick a remedy for the anomaly the last probe saw
    pub fn for_anomaly(anomaly: Option<&LogAnomaly>) -> Self {
        match anomaly.map(|a| a.signature.as_str()) {
            Some("missing-module") => Remedy::Reinstall,
            Some("disk-full") => Remedy::FlushLogs,
            Some("database-locked") => Remedy::ClearDatabaseLocks,
            Some("permission-denied") => Remedy::FixPermissions,
            _ => Remedy::Restart,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Remedy::Reinstall => "reinstall",
            Remedy::FlushLogs => "flush-logs",
            Remedy::ClearDatabaseLocks => "clear-database-locks",
            Remedy::FixPermissions => "fix-permissions",
            Remedy::Restart => "restart",
        }
    }
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preserved files that look like SQLite databases
pub fn sqlite_files(preserve: &[String]) -> Vec<&str> {
    preserve
        .iter()
        .map(String::as_str)
        .filter(|f| f.ends_with(".db") || f.ends_with(".sqlite") || f.ends_with(".sqlite3"))
        .collect()
}

/// Re-own `path` to the remote user and make it user-writable.
///
/// `chown` goes through non-interactive sudo and may fail without a sudoers
/// entry; `chmod` still runs. The command fails if `chmod` does.
pub fn permissions_command(path: &str) -> String {
    let path = shell_quote(path);
    format!(
        "sudo -n chown -R \"$(id -un)\":\"$(id -gn)\" {path} 2>&1; chmod -R u+rwX {path}",
        path = path
    )
}
