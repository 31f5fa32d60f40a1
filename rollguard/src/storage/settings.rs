//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ControllerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DISCORD_WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

/// Controller settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployment target
    #[serde(default)]
    pub target: TargetSettings,

    /// Source repository
    #[serde(default)]
    pub repository: RepositorySettings,

    /// CI provider
    #[serde(default)]
    pub ci: CiSettings,

    /// Health probing
    #[serde(default)]
    pub health: HealthSettings,

    /// Recovery tiers
    #[serde(default)]
    pub recovery: RecoverySettings,

    /// Terminal notifications
    #[serde(default)]
    pub notify: NotifySettings,

    /// Deploy from the controller after CI succeeds. When false the CI job
    /// is expected to run `rollguard deploy` itself.
    #[serde(default)]
    pub deploy_on_ci_success: bool,
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

/// Deployment target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSettings {
    /// Run target commands on this machine instead of over SSH
    #[serde(default)]
    pub local: bool,

    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub identity_file: Option<String>,

    /// Live deployment path
    #[serde(default = "default_deploy_path")]
    pub deploy_path: String,

    /// Single backup slot path
    #[serde(default = "default_backup_path")]
    pub backup_path: String,

    /// PM2 app name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_start_script")]
    pub start_script: String,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_install_command")]
    pub install_command: Option<String>,

    /// Files carried forward across deployments, relative to the deploy path
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,

    /// Refuse to snapshot below this much free disk
    #[serde(default = "default_min_free_kb")]
    pub min_free_kb: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_deploy_path() -> String {
    "/home/ubuntu/app".to_string()
}

fn default_backup_path() -> String {
    "/home/ubuntu/app-backup".to_string()
}

fn default_app_name() -> String {
    "app".to_string()
}

fn default_start_script() -> String {
    "main.py".to_string()
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_install_command() -> Option<String> {
    Some("pip3 install -r requirements.txt".to_string())
}

fn default_preserve() -> Vec<String> {
    vec!["config.yaml".to_string(), ".env".to_string()]
}

fn default_min_free_kb() -> u64 {
    512 * 1024
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    300
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            local: false,
            host: String::new(),
            user: default_ssh_user(),
            port: default_ssh_port(),
            identity_file: None,
            deploy_path: default_deploy_path(),
            backup_path: default_backup_path(),
            app_name: default_app_name(),
            start_script: default_start_script(),
            interpreter: default_interpreter(),
            install_command: default_install_command(),
            preserve: default_preserve(),
            min_free_kb: default_min_free_kb(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Source repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Local working copy that revisions are pushed from
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Git remote to push to
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Clone URL used on the target
    #[serde(default)]
    pub url: String,

    /// GitHub `owner/name`
    #[serde(default)]
    pub github: String,

    /// Branch CI watches
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_local_path() -> String {
    ".".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            remote: default_remote(),
            url: String::new(),
            github: String::new(),
            branch: default_branch(),
        }
    }
}

/// CI provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token; `GITHUB_TOKEN` overrides it
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_discovery_window")]
    pub discovery_window_secs: u64,

    #[serde(default = "default_ci_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_initial_delay() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    15
}

fn default_discovery_window() -> u64 {
    120
}

fn default_ci_timeout() -> u64 {
    1800
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CiSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            initial_delay_secs: default_initial_delay(),
            poll_interval_secs: default_poll_interval(),
            discovery_window_secs: default_discovery_window(),
            timeout_secs: default_ci_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Extra log signature, checked after the built-in ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSetting {
    pub name: String,
    pub pattern: String,
}

/// Health probing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,

    /// Overall budget for one retry sequence
    #[serde(default = "default_health_deadline")]
    pub deadline_secs: u64,

    /// Budget for a single probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_log_lines")]
    pub log_lines: u32,

    #[serde(default)]
    pub extra_signatures: Vec<SignatureSetting>,
}

fn default_attempts() -> u32 {
    10
}

fn default_health_interval() -> u64 {
    30
}

fn default_warmup() -> u64 {
    10
}

fn default_health_deadline() -> u64 {
    360
}

fn default_probe_timeout() -> u64 {
    20
}

fn default_log_lines() -> u32 {
    100
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_secs: default_health_interval(),
            warmup_secs: default_warmup(),
            deadline_secs: default_health_deadline(),
            probe_timeout_secs: default_probe_timeout(),
            log_lines: default_log_lines(),
            extra_signatures: Vec::new(),
        }
    }
}

/// Recovery tier switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default = "default_true")]
    pub self_heal_enabled: bool,

    #[serde(default = "default_true")]
    pub rollback_enabled: bool,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            self_heal_enabled: true,
            rollback_enabled: true,
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    /// Discord webhook; `DISCORD_WEBHOOK_URL` overrides it
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub discord_webhook_url: Option<SecretString>,

    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it is missing,
    /// then apply secrets from the environment
    pub async fn load(file: &File) -> Result<Self, ControllerError> {
        let mut settings = if file.exists().await {
            debug!(path = %file.path().display(), "Loading settings");
            file.read_json::<Settings>().await?
        } else {
            info!(path = %file.path().display(), "No settings file, using defaults");
            Settings::default()
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Take secrets from the environment. Non-empty values win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(GITHUB_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.ci.token = Some(SecretString::from(token));
        }
        if let Some(url) = lookup(DISCORD_WEBHOOK_ENV).filter(|v| !v.is_empty()) {
            self.notify.discord_webhook_url = Some(SecretString::from(url));
        }
    }

    /// Set one value by dotted path, e.g. `ci.poll_interval_secs=10`.
    ///
    /// The value is parsed as JSON when the field is not a string, so lists
    /// and booleans can be given as `["a","b"]` and `true`.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ControllerError> {
        let mut tree = serde_json::to_value(&*self)?;
        set_path(&mut tree, key, value)?;
        let mut updated: Settings = serde_json::from_value(tree)
            .map_err(|e| ControllerError::ConfigError(format!("{}: {}", key, e)))?;

        // Secrets are never serialized, so carry them over by hand
        updated.ci.token = self.ci.token.take();
        updated.notify.discord_webhook_url = self.notify.discord_webhook_url.take();
        *self = updated;
        Ok(())
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<(), ControllerError> {
        let target = &self.target;
        if target.deploy_path.trim().is_empty() || target.backup_path.trim().is_empty() {
            return Err(ControllerError::ConfigError(
                "target.deploy_path and target.backup_path must be set".to_string(),
            ));
        }
        if target.deploy_path.trim_end_matches('/') == target.backup_path.trim_end_matches('/') {
            return Err(ControllerError::ConfigError(
                "target.backup_path must differ from target.deploy_path".to_string(),
            ));
        }
        if !target.local && target.host.trim().is_empty() {
            return Err(ControllerError::ConfigError(
                "target.host is required unless target.local is set".to_string(),
            ));
        }
        if target.app_name.trim().is_empty() {
            return Err(ControllerError::ConfigError("target.app_name must be set".to_string()));
        }
        if self.health.attempts == 0 {
            return Err(ControllerError::ConfigError("health.attempts must be at least 1".to_string()));
        }
        if self.health.interval_secs == 0 || self.ci.poll_interval_secs == 0 {
            return Err(ControllerError::ConfigError(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn set_path(tree: &mut Value, key: &str, raw: &str) -> Result<(), ControllerError> {
    let mut node = tree;
    for part in key.split('.') {
        node = node
            .get_mut(part)
            .ok_or_else(|| ControllerError::ConfigError(format!("unknown setting: {}", key)))?;
    }
    *node = match node {
        Value::String(_) => Value::String(raw.to_string()),
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    };
    Ok(())
}
