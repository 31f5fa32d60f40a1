//! Recovery escalator tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rollguard::backup::BackupManager;
use rollguard::deploy::executor::{DeployExecutor, DeployOptions};
use rollguard::errors::ControllerError;
use rollguard::health::signatures::SignatureSet;
use rollguard::health::{HealthProbe, HealthProber};
use rollguard::models::health::HealthReport;
use rollguard::models::recovery::RecoveryTier;
use rollguard::models::run::DeploymentRun;
use rollguard::recovery::{EscalatorOptions, RecoveryActions, RecoveryEscalator, TargetRecovery};
use rollguard::remote::RemoteExecutor;
use rollguard::workers::poller::{cancellation, CancelSignal};

use crate::common::{
    crashing, fast_schedule, healthy, output, unhealthy, FakeActions, FakeProbe, Journal,
    ScriptedExecutor,
};

fn escalator(actions: FakeActions, script: Vec<HealthReport>, journal: &Journal) -> RecoveryEscalator {
    RecoveryEscalator::new(
        Arc::new(actions),
        Arc::new(FakeProbe::new(script, journal.clone())),
        EscalatorOptions {
            schedule: fast_schedule(3),
            ..EscalatorOptions::default()
        },
    )
}

fn run() -> DeploymentRun {
    DeploymentRun::new("def5678", "master")
}

#[tokio::test(start_paused = true)]
async fn test_self_heal_success_needs_no_rollback() {
    let journal = Journal::default();
    let esc = escalator(FakeActions::new(journal.clone()), vec![healthy()], &journal);
    let mut run = run();

    let outcome = esc
        .self_heal(&mut run, Some(&unhealthy()), &CancelSignal::never())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.tier, RecoveryTier::SelfHeal);
    assert!(outcome.succeeded);
    assert_eq!(run.attempts_recovery, 1);
    assert_eq!(run.attempts_rollback, 0);
    assert_eq!(journal.entries(), vec!["self_heal:restart", "probe:healthy"]);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_follows_failed_self_heal() {
    let journal = Journal::default();
    let esc = escalator(
        FakeActions::new(journal.clone()),
        vec![unhealthy(), unhealthy(), unhealthy(), healthy()],
        &journal,
    );
    let mut run = run();
    let cancel = CancelSignal::never();

    let heal = esc.self_heal(&mut run, None, &cancel).await.unwrap().unwrap();
    assert!(!heal.succeeded);

    let rollback = esc.rollback(&mut run, &cancel).await.unwrap().unwrap();
    assert_eq!(rollback.tier, RecoveryTier::Rollback);
    assert!(rollback.succeeded);

    let heal_at = journal.position("self_heal:").unwrap();
    let restore_at = journal.position("restore").unwrap();
    let restart_at = journal.position("restart").unwrap();
    assert!(heal_at < restore_at);
    assert!(restore_at < restart_at);
    assert_eq!(journal.count("probe:"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_each_tier_runs_at_most_once() {
    let journal = Journal::default();
    let esc = escalator(FakeActions::new(journal.clone()), vec![unhealthy()], &journal);
    let mut run = run();
    let cancel = CancelSignal::never();

    esc.self_heal(&mut run, None, &cancel).await.unwrap();
    esc.rollback(&mut run, &cancel).await.unwrap();

    assert!(matches!(
        esc.self_heal(&mut run, None, &cancel).await,
        Err(ControllerError::Internal(_))
    ));
    assert!(matches!(
        esc.rollback(&mut run, &cancel).await,
        Err(ControllerError::Internal(_))
    ));
    assert_eq!(journal.count("self_heal:"), 1);
    assert_eq!(journal.count("restore"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_without_backup_is_an_error() {
    let journal = Journal::default();
    let esc = escalator(
        FakeActions::new(journal.clone()).without_backup(),
        vec![unhealthy()],
        &journal,
    );
    let mut run = run();

    let result = esc.rollback(&mut run, &CancelSignal::never()).await;

    assert!(matches!(result, Err(ControllerError::NoBackupAvailable)));
    // No restart and no probe once the restore failed
    assert_eq!(journal.entries(), vec!["restore"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_remediation_skips_probe() {
    let journal = Journal::default();
    let esc = escalator(
        FakeActions::new(journal.clone()).failing_self_heal(),
        vec![healthy()],
        &journal,
    );
    let mut run = run();

    let outcome = esc
        .self_heal(&mut run, None, &CancelSignal::never())
        .await
        .unwrap()
        .unwrap();

    assert!(!outcome.succeeded);
    assert!(outcome.health_after.probe_error.is_some());
    assert_eq!(journal.count("probe:"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remedy_follows_log_anomaly() {
    let journal = Journal::default();
    let esc = escalator(FakeActions::new(journal.clone()), vec![healthy()], &journal);
    let mut run = run();

    esc.self_heal(&mut run, Some(&crashing("missing-module")), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(journal.entries()[0], "self_heal:reinstall");
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_tier_touches_nothing() {
    let journal = Journal::default();
    let esc = escalator(FakeActions::new(journal.clone()), vec![healthy()], &journal);
    let mut run = run();
    let (handle, signal) = cancellation();
    handle.cancel();

    assert!(matches!(
        esc.self_heal(&mut run, None, &signal).await,
        Err(ControllerError::Cancelled)
    ));
    assert!(matches!(
        esc.rollback(&mut run, &signal).await,
        Err(ControllerError::Cancelled)
    ));
    assert!(journal.entries().is_empty());
    assert_eq!(run.attempts_recovery, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_tiers_are_skipped() {
    let journal = Journal::default();
    let esc = RecoveryEscalator::new(
        Arc::new(FakeActions::new(journal.clone())),
        Arc::new(FakeProbe::new(vec![healthy()], journal.clone())),
        EscalatorOptions {
            self_heal_enabled: false,
            rollback_enabled: false,
            schedule: fast_schedule(3),
        },
    );
    let mut run = run();
    let cancel = CancelSignal::never();

    assert!(esc.self_heal(&mut run, None, &cancel).await.unwrap().is_none());
    assert!(esc.rollback(&mut run, &cancel).await.unwrap().is_none());
    assert!(journal.entries().is_empty());
}

// ============================== AGAINST A TARGET ================================ //

const ONLINE: &str = r#"[{"name":"auto-trader","pm2_env":{"status":"online","restart_time":1},"monit":{"memory":52428800,"cpu":1.0}}]"#;
const ERRORED: &str = r#"[{"name":"auto-trader","pm2_env":{"status":"errored","restart_time":1},"monit":{"memory":0,"cpu":0}}]"#;

fn deployer(exec: Arc<dyn RemoteExecutor>) -> (Arc<DeployExecutor>, Arc<BackupManager>) {
    let backup = Arc::new(BackupManager::new(exec.clone(), "/srv/app", "/srv/app-backup", 0));
    let deployer = Arc::new(DeployExecutor::new(
        exec,
        backup.clone(),
        DeployOptions {
            app_name: "auto-trader".to_string(),
            deploy_path: "/srv/app".to_string(),
            repo_url: "https://github.com/acme/trader.git".to_string(),
            start_script: "main.py".to_string(),
            interpreter: "python3".to_string(),
            install_command: None,
            preserve: Vec::new(),
        },
    ));
    (deployer, backup)
}

/// PM2 on the target: log lines persist across restarts unless flushed
#[derive(Default)]
struct Pm2Target {
    online: bool,
    log: Vec<String>,
}

fn pm2_target(state: Arc<Mutex<Pm2Target>>) -> Arc<ScriptedExecutor> {
    Arc::new(ScriptedExecutor::new(move |cmd| {
        let mut target = state.lock().unwrap();
        if cmd.contains("pm2 restart") {
            if cmd.contains("pm2 flush") {
                target.log.clear();
            }
            target.online = true;
            target.log.push("INFO bot started".to_string());
            Ok(output(0, ""))
        } else if cmd.starts_with("pm2 jlist") {
            Ok(output(0, if target.online { ONLINE } else { ERRORED }))
        } else if cmd.starts_with("pm2 logs") {
            Ok(output(0, &target.log.join("\n")))
        } else {
            Ok(output(0, ""))
        }
    }))
}

#[tokio::test(start_paused = true)]
async fn test_self_heal_ignores_output_from_before_the_restart() {
    let state = Arc::new(Mutex::new(Pm2Target {
        online: false,
        log: vec![
            "INFO tick".to_string(),
            "Traceback (most recent call last):".to_string(),
            "KeyError: 'price'".to_string(),
        ],
    }));
    let exec: Arc<dyn RemoteExecutor> = pm2_target(state.clone());
    let (deployer, backup) = deployer(exec.clone());
    let prober = Arc::new(HealthProber::new(
        exec.clone(),
        "auto-trader",
        "/srv/app",
        100,
        Duration::from_secs(20),
        SignatureSet::builtin(),
    ));
    let esc = RecoveryEscalator::new(
        Arc::new(TargetRecovery::new(exec, deployer, backup)),
        prober.clone(),
        EscalatorOptions {
            schedule: fast_schedule(3),
            ..EscalatorOptions::default()
        },
    );

    let before = prober.probe().await;
    assert_eq!(before.log_anomaly.as_ref().unwrap().signature, "unhandled-exception");

    let mut run = run();
    let outcome = esc
        .self_heal(&mut run, Some(&before), &CancelSignal::never())
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.succeeded, "after: {}", outcome.health_after.summary());
    assert!(outcome.health_after.is_healthy());
    assert_eq!(state.lock().unwrap().log, vec!["INFO bot started"]);
}

#[tokio::test]
async fn test_restore_inspects_slot_before_swapping() {
    let exec = Arc::new(ScriptedExecutor::new(|cmd| {
        if cmd.contains("test -d \"$SLOT\"") {
            Ok(output(1, ""))
        } else {
            Ok(output(20, ""))
        }
    }));
    let dyn_exec: Arc<dyn RemoteExecutor> = exec.clone();
    let (deployer, backup) = deployer(dyn_exec.clone());
    let actions = TargetRecovery::new(dyn_exec, deployer, backup);

    let result = actions.restore_snapshot().await;

    assert!(matches!(result, Err(ControllerError::NoBackupAvailable)));
    let commands = exec.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].ends_with("test -d \"$SLOT\""));
    assert!(commands[1].contains("mv \"$SLOT\" \"$LIVE\""));
}
