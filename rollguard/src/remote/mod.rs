//! Command execution against the deployment target

pub mod local;
pub mod ssh;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ControllerError;
use crate::utils::tail;

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short description of a failed command for error messages
    pub fn failure_message(&self) -> String {
        let detail = if self.stderr.trim().is_empty() {
            tail(&self.stdout, 300)
        } else {
            tail(&self.stderr, 300)
        };
        format!("exit code {}: {}", self.exit_code, detail)
    }
}

/// Runs shell commands on the deployment target.
///
/// A non-zero exit status is a normal `Ok` result; `Err` means the command
/// could not be run to completion (spawn failure, lost connection, timeout).
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandOutput, ControllerError>;

    /// Where commands run, for logs
    fn target(&self) -> String;
}

/// Run a prepared command with a hard timeout, killing it on expiry
pub(crate) async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<CommandOutput, ControllerError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|e| ControllerError::Remote(format!("spawn failed: {}", e)))?,
        Err(_) => {
            return Err(ControllerError::Timeout(format!(
                "command did not finish within {:?}",
                timeout
            )))
        }
    };

    let result = CommandOutput {
        // Killed by a signal reports no code
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(exit_code = result.exit_code, "command finished");
    Ok(result)
}
