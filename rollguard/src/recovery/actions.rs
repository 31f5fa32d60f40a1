//! Target-side recovery actions

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::deploy::executor::DeployExecutor;
use crate::deploy::pm2;
use crate::errors::ControllerError;
use crate::models::snapshot::Snapshot;
use crate::recovery::remedy::{permissions_command, sqlite_files, Remedy};
use crate::remote::RemoteExecutor;
use crate::utils::{shell_quote, tail};

/// Mutations the escalator may perform on the target
#[async_trait]
pub trait RecoveryActions: Send + Sync {
    /// Apply `remedy`, then restart the service
    async fn self_heal(&self, remedy: Remedy) -> Result<(), ControllerError>;

    /// Swap the backup slot back into the live path
    async fn restore_snapshot(&self) -> Result<Snapshot, ControllerError>;

    /// Restart the service without touching code
    async fn restart(&self) -> Result<(), ControllerError>;
}

/// Recovery actions against the real target
pub struct TargetRecovery {
    exec: Arc<dyn RemoteExecutor>,
    deployer: Arc<DeployExecutor>,
    backup: Arc<BackupManager>,
}

impl TargetRecovery {
    pub fn new(
        exec: Arc<dyn RemoteExecutor>,
        deployer: Arc<DeployExecutor>,
        backup: Arc<BackupManager>,
    ) -> Self {
        Self {
            exec,
            deployer,
            backup,
        }
    }

    async fn log_diagnostics(&self) {
        let app = &self.deployer.options().app_name;
        match self.exec.exec(&pm2::describe(app)).await {
            Ok(out) => debug!("pm2 describe {}:\n{}", app, tail(&out.stdout, 4000)),
            Err(e) => debug!("Could not describe {}: {}", app, e),
        }
    }

    async fn clear_database_locks(&self) -> Result<(), ControllerError> {
        let options = self.deployer.options();
        let databases = sqlite_files(&options.preserve);
        if databases.is_empty() {
            warn!("No preserved databases to unlock");
            return Ok(());
        }

        let mut command = format!("cd {}", shell_quote(&options.deploy_path));
        for db in databases {
            command.push_str(&format!(
                " && rm -f {} {}",
                shell_quote(&format!("{}-wal", db)),
                shell_quote(&format!("{}-shm", db))
            ));
        }
        let output = self.exec.exec(&command).await?;
        if !output.success() {
            return Err(ControllerError::Remote(output.failure_message()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecoveryActions for TargetRecovery {
    async fn self_heal(&self, remedy: Remedy) -> Result<(), ControllerError> {
        info!(%remedy, "Applying self-heal remedy");
        self.log_diagnostics().await;

        match remedy {
            Remedy::Reinstall => self.deployer.install().await?,
            Remedy::FlushLogs => {
                let output = self.exec.exec(&pm2::flush_all()).await?;
                if !output.success() {
                    warn!("pm2 flush failed: {}", output.failure_message());
                }
            }
            Remedy::ClearDatabaseLocks => self.clear_database_locks().await?,
            Remedy::FixPermissions => {
                let command = permissions_command(&self.deployer.options().deploy_path);
                let output = self.exec.exec(&command).await?;
                if !output.success() {
                    return Err(ControllerError::Remote(output.failure_message()));
                }
            }
            Remedy::Restart => {}
        }

        self.deployer.restart().await
    }

    async fn restore_snapshot(&self) -> Result<Snapshot, ControllerError> {
        // The restore script re-checks the slot under its lock
        match self.backup.has_backup().await {
            Ok(true) => debug!("Backup slot occupied"),
            Ok(false) => warn!("Backup slot is empty"),
            Err(e) => debug!("Could not inspect backup slot: {}", e),
        }
        self.backup.restore_snapshot().await
    }

    async fn restart(&self) -> Result<(), ControllerError> {
        self.deployer.restart().await
    }
}
