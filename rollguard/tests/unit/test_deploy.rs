//! Deploy executor tests

use std::sync::Arc;

use rollguard::backup::BackupManager;
use rollguard::deploy::executor::{DeployExecutor, DeployOptions};
use rollguard::deploy::Release;
use rollguard::errors::{ControllerError, DeployStage};
use rollguard::remote::RemoteExecutor;

use crate::common::{output, ScriptedExecutor};

fn options() -> DeployOptions {
    DeployOptions {
        app_name: "auto-trader".to_string(),
        deploy_path: "/srv/app".to_string(),
        repo_url: "https://github.com/acme/trader.git".to_string(),
        start_script: "main.py".to_string(),
        interpreter: "python3".to_string(),
        install_command: Some("pip3 install -r requirements.txt".to_string()),
        preserve: vec!["config.yaml".to_string()],
    }
}

fn executor_with(exec: Arc<ScriptedExecutor>) -> DeployExecutor {
    let dyn_exec: Arc<dyn RemoteExecutor> = exec;
    let backup = Arc::new(BackupManager::new(dyn_exec.clone(), "/srv/app", "/srv/app-backup", 0));
    DeployExecutor::new(dyn_exec, backup, options())
}

fn stage_of(command: &str) -> &'static str {
    if command.contains("pm2 stop") {
        "stop"
    } else if command.contains("git clone") {
        "transfer"
    } else if command.contains("exit 30") {
        "carry-forward"
    } else if command.contains("pip3 install") {
        "install"
    } else if command.contains("pm2 save") {
        "restart"
    } else if command.contains("mv \"$LIVE\" \"$SLOT\"") {
        "snapshot"
    } else if command.contains("$META") {
        "snapshot-meta"
    } else {
        "other"
    }
}

#[tokio::test]
async fn test_deploy_runs_every_stage_in_order() {
    let exec = Arc::new(ScriptedExecutor::ok());
    let deployer = executor_with(exec.clone());

    deployer
        .deploy("def5678", "master", &options().preserve)
        .await
        .unwrap();

    let stages: Vec<&str> = exec.commands().iter().map(|c| stage_of(c)).collect();
    assert_eq!(stages, vec!["stop", "transfer", "carry-forward", "install", "restart"]);
}

#[tokio::test]
async fn test_deploy_failure_carries_stage_tag() {
    let exec = Arc::new(ScriptedExecutor::new(|cmd| {
        if cmd.contains("pip3 install") {
            Ok(output(1, ""))
        } else {
            Ok(output(0, ""))
        }
    }));
    let deployer = executor_with(exec.clone());

    let err = deployer.deploy("def5678", "master", &[]).await.unwrap_err();
    match err {
        ControllerError::Deploy { stage, .. } => assert_eq!(stage, DeployStage::Install),
        other => panic!("unexpected error: {other}"),
    }
    // Nothing after the failed stage
    assert!(!exec.commands().iter().any(|c| c.contains("pm2 save")));
}

#[tokio::test]
async fn test_deploy_can_run_twice() {
    let exec = Arc::new(ScriptedExecutor::ok());
    let deployer = executor_with(exec.clone());

    deployer.deploy("def5678", "master", &[]).await.unwrap();
    deployer.deploy("def5678", "master", &[]).await.unwrap();

    let stops = exec.commands().iter().filter(|c| stage_of(c) == "stop").count();
    let restarts = exec.commands().iter().filter(|c| stage_of(c) == "restart").count();
    assert_eq!((stops, restarts), (2, 2));
}

#[tokio::test]
async fn test_release_snapshots_before_transfer() {
    let exec = Arc::new(ScriptedExecutor::new(|cmd| {
        if cmd.contains("mv \"$LIVE\" \"$SLOT\"") {
            Ok(output(0, "abc1234\n"))
        } else {
            Ok(output(0, ""))
        }
    }));
    let deployer = executor_with(exec.clone());

    let snapshot = deployer.release("def5678", "master").await.unwrap().unwrap();
    assert_eq!(snapshot.source_revision, "abc1234");

    let stages: Vec<&str> = exec.commands().iter().map(|c| stage_of(c)).collect();
    let snapshot_at = stages.iter().position(|s| *s == "snapshot").unwrap();
    let transfer_at = stages.iter().position(|s| *s == "transfer").unwrap();
    assert!(snapshot_at < transfer_at);
}

#[tokio::test]
async fn test_release_restarts_old_tree_when_snapshot_fails() {
    let exec = Arc::new(ScriptedExecutor::new(|cmd| {
        if cmd.contains("mv \"$LIVE\" \"$SLOT\"") {
            Ok(output(12, ""))
        } else {
            Ok(output(0, ""))
        }
    }));
    let deployer = executor_with(exec.clone());

    let err = deployer.release("def5678", "master").await.unwrap_err();
    assert!(matches!(err, ControllerError::Backup(_)));

    let stages: Vec<&str> = exec.commands().iter().map(|c| stage_of(c)).collect();
    assert_eq!(stages, vec!["stop", "snapshot", "restart"]);
}
