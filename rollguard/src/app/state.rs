//! Application state management

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::app::options::{AppOptions, TargetOptions};
use crate::backup::BackupManager;
use crate::deploy::executor::DeployExecutor;
use crate::deploy::git::GitPublisher;
use crate::errors::ControllerError;
use crate::health::signatures::SignatureSet;
use crate::health::HealthProber;
use crate::http::{GithubActions, HttpClient};
use crate::notify::{DiscordNotifier, LogNotifier, Notifier};
use crate::orchestrator::{Controller, ControllerOptions};
use crate::recovery::{RecoveryEscalator, TargetRecovery};
use crate::remote::local::LocalExecutor;
use crate::remote::ssh::SshExecutor;
use crate::remote::RemoteExecutor;
use crate::workers::monitor::WorkflowMonitor;

/// Every component, wired once per process
pub struct AppState {
    pub options: AppOptions,
    pub exec: Arc<dyn RemoteExecutor>,
    pub backup: Arc<BackupManager>,
    pub deployer: Arc<DeployExecutor>,
    pub prober: Arc<HealthProber>,
    pub escalator: Arc<RecoveryEscalator>,
    pub monitor: Arc<WorkflowMonitor>,
    pub publisher: Arc<GitPublisher>,
    pub notifier: Arc<dyn Notifier>,
    pub controller: Arc<Controller>,
}

impl AppState {
    /// Initialize application state
    pub fn init(
        options: AppOptions,
        github_token: Option<SecretString>,
        discord_webhook: Option<SecretString>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing application state...");

        let exec: Arc<dyn RemoteExecutor> = match &options.target {
            TargetOptions::Local { command_timeout } => Arc::new(LocalExecutor::new(*command_timeout)),
            TargetOptions::Ssh(ssh) => Arc::new(SshExecutor::new(ssh.clone())),
        };
        info!(target = %exec.target(), "Deployment target");

        let backup = Arc::new(BackupManager::new(
            exec.clone(),
            options.backup.live_path.clone(),
            options.backup.slot_path.clone(),
            options.backup.min_free_kb,
        ));

        let deployer = Arc::new(DeployExecutor::new(
            exec.clone(),
            backup.clone(),
            options.deploy.clone(),
        ));

        let signatures = SignatureSet::with_extra(&options.prober.extra_signatures)
            .map_err(|e| ControllerError::ConfigError(format!("invalid log signature: {}", e)))?;
        let prober = Arc::new(HealthProber::new(
            exec.clone(),
            options.deploy.app_name.clone(),
            options.deploy.deploy_path.clone(),
            options.prober.log_lines,
            options.prober.probe_timeout,
            signatures,
        ));

        let recovery = Arc::new(TargetRecovery::new(exec.clone(), deployer.clone(), backup.clone()));
        let escalator = Arc::new(RecoveryEscalator::new(
            recovery,
            prober.clone(),
            options.escalator.clone(),
        ));

        let http = HttpClient::new(&options.ci.api_url, github_token, options.ci.request_timeout)?;
        let provider = Arc::new(GithubActions::new(http, options.ci.repository.clone()));
        let monitor = Arc::new(WorkflowMonitor::new(provider, options.monitor.clone()));

        let publisher = Arc::new(GitPublisher::new(
            options.publish.repo_dir.clone(),
            options.publish.remote.clone(),
            options.publish.timeout,
        ));

        let notifier: Arc<dyn Notifier> = match discord_webhook {
            Some(url) => Arc::new(DiscordNotifier::new(url, options.notify_timeout)?),
            None => {
                info!("No Discord webhook configured, notifications go to the log");
                Arc::new(LogNotifier)
            }
        };

        let mut controller = Controller::new(
            publisher.clone(),
            monitor.clone(),
            prober.clone(),
            escalator.clone(),
            notifier.clone(),
            ControllerOptions {
                schedule: options.schedule.clone(),
            },
        );
        if options.deploy_on_ci_success {
            controller = controller.with_release(deployer.clone());
        }

        Ok(Self {
            options,
            exec,
            backup,
            deployer,
            prober,
            escalator,
            monitor,
            publisher,
            notifier,
            controller: Arc::new(controller),
        })
    }
}
