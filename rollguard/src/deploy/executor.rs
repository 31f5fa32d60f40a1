//! Remote deploy executor

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::backup::BackupManager;
use crate::deploy::{pm2, Release};
use crate::errors::{ControllerError, DeployStage};
use crate::models::snapshot::Snapshot;
use crate::remote::{CommandOutput, RemoteExecutor};
use crate::utils::shell_quote;

/// What to deploy and how to run it
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Supervisor app name
    pub app_name: String,

    /// Live deployment path on the target
    pub deploy_path: String,

    /// Git URL the target clones from
    pub repo_url: String,

    /// Entry script, relative to the deploy path
    pub start_script: String,

    /// Interpreter PM2 runs the script with
    pub interpreter: String,

    /// Dependency install command run inside the deploy path
    pub install_command: Option<String>,

    /// Files carried forward from the previous deployment
    pub preserve: Vec<String>,
}

/// Stops, transfers, installs and restarts the service on the target
pub struct DeployExecutor {
    exec: Arc<dyn RemoteExecutor>,
    backup: Arc<BackupManager>,
    options: DeployOptions,
}

impl DeployExecutor {
    pub fn new(
        exec: Arc<dyn RemoteExecutor>,
        backup: Arc<BackupManager>,
        options: DeployOptions,
    ) -> Self {
        Self {
            exec,
            backup,
            options,
        }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    async fn run_stage(
        &self,
        stage: DeployStage,
        command: &str,
    ) -> Result<CommandOutput, ControllerError> {
        let output = self
            .exec
            .exec(command)
            .await
            .map_err(|e| ControllerError::deploy(stage, e.to_string()))?;
        if !output.success() {
            error!(%stage, "Deploy stage failed: {}", output.failure_message());
            return Err(ControllerError::deploy(stage, output.failure_message()));
        }
        Ok(output)
    }

    /// Deploy `revision` into the live path.
    ///
    /// Always runs the full stop/transfer/install/restart sequence, so it is
    /// safe to call again after a partial failure.
    pub async fn deploy(
        &self,
        revision: &str,
        branch: &str,
        preserve: &[String],
    ) -> Result<(), ControllerError> {
        info!(%revision, %branch, target = %self.exec.target(), "Deploying revision");

        self.stop().await?;
        self.transfer(revision, branch).await?;

        let copied = self
            .backup
            .carry_forward(preserve)
            .await
            .map_err(|e| ControllerError::deploy(DeployStage::Transfer, e.to_string()))?;
        if copied.len() < preserve.len() {
            warn!(
                expected = preserve.len(),
                copied = copied.len(),
                "Some preserved files were not found in the previous deployment"
            );
        }

        self.install().await?;
        self.restart().await?;

        info!(%revision, "Revision deployed");
        Ok(())
    }

    /// Stop the service
    pub async fn stop(&self) -> Result<(), ControllerError> {
        self.run_stage(DeployStage::Stop, &pm2::stop(&self.options.app_name))
            .await
            .map(|_| ())
    }

    async fn transfer(&self, revision: &str, branch: &str) -> Result<(), ControllerError> {
        let live = shell_quote(&self.options.deploy_path);
        let rev = shell_quote(revision);
        let command = format!(
            "if [ -d {live}/.git ]; then git -C {live} fetch --quiet origin {branch} && git -C {live} checkout --quiet --force {rev}; \
             else rm -rf {live} && git clone --quiet --branch {branch} {repo} {live} && git -C {live} checkout --quiet --force {rev}; fi",
            live = live,
            rev = rev,
            branch = shell_quote(branch),
            repo = shell_quote(&self.options.repo_url),
        );
        self.run_stage(DeployStage::Transfer, &command).await.map(|_| ())
    }

    /// Reinstall declared dependencies
    pub async fn install(&self) -> Result<(), ControllerError> {
        let Some(install) = self.options.install_command.as_deref().filter(|c| !c.trim().is_empty())
        else {
            return Ok(());
        };
        let command = format!("cd {} && {}", shell_quote(&self.options.deploy_path), install);
        self.run_stage(DeployStage::Install, &command).await.map(|_| ())
    }

    /// (Re)start the service from the live path
    pub async fn restart(&self) -> Result<(), ControllerError> {
        let command = pm2::start_or_restart(
            &self.options.app_name,
            &self.options.deploy_path,
            &self.options.start_script,
            &self.options.interpreter,
        );
        self.run_stage(DeployStage::Restart, &command).await.map(|_| ())
    }
}

#[async_trait]
impl Release for DeployExecutor {
    async fn release(&self, revision: &str, branch: &str) -> Result<Option<Snapshot>, ControllerError> {
        self.stop().await?;

        let snapshot = match self.backup.create_snapshot(revision).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Nothing was moved; bring the old tree back up before reporting
                if let Err(restart_err) = self.restart().await {
                    error!("Restart after failed snapshot also failed: {}", restart_err);
                }
                return Err(e);
            }
        };

        self.deploy(revision, branch, &self.options.preserve).await?;
        Ok(snapshot)
    }
}
