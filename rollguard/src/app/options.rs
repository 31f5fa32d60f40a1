//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::executor::DeployOptions;
use crate::health::ProbeSchedule;
use crate::recovery::EscalatorOptions;
use crate::remote::ssh::SshOptions;
use crate::storage::settings::Settings;
use crate::workers::monitor::MonitorOptions;

/// How target commands are executed
#[derive(Debug, Clone)]
pub enum TargetOptions {
    /// Commands run on this machine
    Local { command_timeout: Duration },

    /// Commands run over SSH
    Ssh(SshOptions),
}

/// Backup slot options
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub live_path: String,
    pub slot_path: String,
    pub min_free_kb: u64,
}

/// Health prober options
#[derive(Debug, Clone)]
pub struct ProberOptions {
    pub probe_timeout: Duration,
    pub log_lines: u32,
    pub extra_signatures: Vec<(String, String)>,
}

/// Publisher options
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub repo_dir: PathBuf,
    pub remote: String,
    pub timeout: Duration,
}

/// CI provider options
#[derive(Debug, Clone)]
pub struct CiOptions {
    pub api_url: String,
    pub repository: String,
    pub request_timeout: Duration,
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub target: TargetOptions,
    pub backup: BackupOptions,
    pub deploy: DeployOptions,
    pub prober: ProberOptions,
    pub schedule: ProbeSchedule,
    pub escalator: EscalatorOptions,
    pub monitor: MonitorOptions,
    pub publish: PublishOptions,
    pub ci: CiOptions,
    pub notify_timeout: Duration,
    pub default_branch: String,
    pub deploy_on_ci_success: bool,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let target = &settings.target;
        let command_timeout = Duration::from_secs(target.command_timeout_secs);

        let target_options = if target.local {
            TargetOptions::Local { command_timeout }
        } else {
            TargetOptions::Ssh(SshOptions {
                host: target.host.clone(),
                user: target.user.clone(),
                port: target.port,
                identity_file: target.identity_file.as_ref().map(PathBuf::from),
                connect_timeout: Duration::from_secs(target.connect_timeout_secs),
                command_timeout,
            })
        };

        let schedule = ProbeSchedule {
            attempts: settings.health.attempts,
            interval: Duration::from_secs(settings.health.interval_secs),
            warmup: Duration::from_secs(settings.health.warmup_secs),
            deadline: Duration::from_secs(settings.health.deadline_secs),
        };

        Self {
            target: target_options,
            backup: BackupOptions {
                live_path: target.deploy_path.clone(),
                slot_path: target.backup_path.clone(),
                min_free_kb: target.min_free_kb,
            },
            deploy: DeployOptions {
                app_name: target.app_name.clone(),
                deploy_path: target.deploy_path.clone(),
                repo_url: settings.repository.url.clone(),
                start_script: target.start_script.clone(),
                interpreter: target.interpreter.clone(),
                install_command: target.install_command.clone(),
                preserve: target.preserve.clone(),
            },
            prober: ProberOptions {
                probe_timeout: Duration::from_secs(settings.health.probe_timeout_secs),
                log_lines: settings.health.log_lines,
                extra_signatures: settings
                    .health
                    .extra_signatures
                    .iter()
                    .map(|s| (s.name.clone(), s.pattern.clone()))
                    .collect(),
            },
            escalator: EscalatorOptions {
                self_heal_enabled: settings.recovery.self_heal_enabled,
                rollback_enabled: settings.recovery.rollback_enabled,
                schedule: schedule.clone(),
            },
            schedule,
            monitor: MonitorOptions {
                initial_delay: Duration::from_secs(settings.ci.initial_delay_secs),
                interval: Duration::from_secs(settings.ci.poll_interval_secs),
                discovery_window: Duration::from_secs(settings.ci.discovery_window_secs),
                timeout: Duration::from_secs(settings.ci.timeout_secs),
            },
            publish: PublishOptions {
                repo_dir: PathBuf::from(&settings.repository.local_path),
                remote: settings.repository.remote.clone(),
                timeout: Duration::from_secs(120),
            },
            ci: CiOptions {
                api_url: settings.ci.api_url.clone(),
                repository: settings.repository.github.clone(),
                request_timeout: Duration::from_secs(settings.ci.request_timeout_secs),
            },
            notify_timeout: Duration::from_secs(settings.notify.timeout_secs),
            default_branch: settings.repository.branch.clone(),
            deploy_on_ci_success: settings.deploy_on_ci_success,
        }
    }
}
