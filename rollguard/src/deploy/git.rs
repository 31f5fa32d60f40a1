//! Publishing a revision with the local git client

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::deploy::Publisher;
use crate::errors::ControllerError;
use crate::remote::{run_with_timeout, CommandOutput};

/// Pushes revisions from a local working copy
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_dir: PathBuf,
    remote: String,
    timeout: Duration,
}

impl GitPublisher {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>, timeout: Duration) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.into(),
            timeout,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput, ControllerError> {
        debug!("git {}", args.join(" "));
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_dir).args(args);
        run_with_timeout(cmd, self.timeout)
            .await
            .map_err(|e| ControllerError::Publish(format!("git {}: {}", args[0], e)))
    }

    /// Resolve a revision expression (`HEAD`, a branch, a short SHA) to a full SHA
    pub async fn resolve(&self, revision: &str) -> Result<String, ControllerError> {
        let output = self.git(&["rev-parse", "--verify", revision]).await?;
        if !output.success() {
            return Err(ControllerError::Publish(format!(
                "unknown revision {}: {}",
                revision,
                output.failure_message()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn assert_no_conflicts(&self) -> Result<(), ControllerError> {
        let output = self.git(&["diff", "--name-only", "--diff-filter=U"]).await?;
        if !output.success() {
            return Err(ControllerError::Publish(output.failure_message()));
        }
        let conflicted: Vec<&str> = output.stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        if !conflicted.is_empty() {
            return Err(ControllerError::Publish(format!(
                "unresolved conflicts in: {}",
                conflicted.join(", ")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, revision: &str, branch: &str) -> Result<(), ControllerError> {
        self.assert_no_conflicts().await?;

        info!(%revision, %branch, remote = %self.remote, "Pushing revision");
        let refspec = format!("{}:refs/heads/{}", revision, branch);
        let output = self.git(&["push", &self.remote, &refspec]).await?;
        if !output.success() {
            return Err(ControllerError::Publish(format!(
                "git push failed: {}",
                output.failure_message()
            )));
        }

        info!("Push acknowledged");
        Ok(())
    }
}
