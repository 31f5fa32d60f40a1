//! SSH executor

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ControllerError;
use crate::remote::{run_with_timeout, CommandOutput, RemoteExecutor};

/// ssh reserves this exit status for its own failures
const SSH_ERROR_EXIT: i32 = 255;

/// SSH connection options
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

/// Runs commands on the target through the system `ssh` client in batch mode
#[derive(Debug, Clone)]
pub struct SshExecutor {
    options: SshOptions,
}

impl SshExecutor {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn build_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-p".to_string(),
            self.options.port.to_string(),
        ];
        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.options.user, self.options.host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn exec(&self, command: &str) -> Result<CommandOutput, ControllerError> {
        debug!(host = %self.options.host, "ssh exec: {}", command);
        let mut cmd = Command::new("ssh");
        cmd.args(self.build_args(command));

        let output = run_with_timeout(cmd, self.options.command_timeout).await?;
        if output.exit_code == SSH_ERROR_EXIT {
            warn!(host = %self.options.host, "ssh connection failed");
            return Err(ControllerError::Remote(format!(
                "ssh to {} failed: {}",
                self.options.host,
                output.failure_message()
            )));
        }
        Ok(output)
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.options.user, self.options.host, self.options.port)
    }
}
