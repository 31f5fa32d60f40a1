//! Executor for a controller running on the deployment host itself

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ControllerError;
use crate::remote::{run_with_timeout, CommandOutput, RemoteExecutor};

/// Runs commands through `bash -c` on this machine
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    command_timeout: Duration,
}

impl LocalExecutor {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn exec(&self, command: &str) -> Result<CommandOutput, ControllerError> {
        debug!("local exec: {}", command);
        let mut cmd = Command::new("bash");
        cmd.args(["-c", command]);
        run_with_timeout(cmd, self.command_timeout).await
    }

    fn target(&self) -> String {
        "localhost".to_string()
    }
}
