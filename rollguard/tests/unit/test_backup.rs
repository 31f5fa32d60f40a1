//! Backup manager tests against a real filesystem

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rollguard::backup::BackupManager;
use rollguard::errors::ControllerError;
use rollguard::remote::local::LocalExecutor;

struct Fixture {
    dir: tempfile::TempDir,
    manager: BackupManager,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("app");
        let slot = dir.path().join("app-backup");
        let manager = BackupManager::new(
            Arc::new(LocalExecutor::new(Duration::from_secs(30))),
            live.to_string_lossy().to_string(),
            slot.to_string_lossy().to_string(),
            0,
        );
        Self { dir, manager }
    }

    fn live(&self) -> std::path::PathBuf {
        self.dir.path().join("app")
    }

    fn slot(&self) -> std::path::PathBuf {
        self.dir.path().join("app-backup")
    }

    fn write_live(&self, name: &str, contents: &str) {
        let path = self.live().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_first_deploy_has_nothing_to_snapshot() {
    let fx = Fixture::new();
    let snapshot = fx.manager.create_snapshot("rev-1").await.unwrap();
    assert!(snapshot.is_none());
    assert!(!fx.manager.has_backup().await.unwrap());
}

#[tokio::test]
async fn test_snapshot_then_restore() {
    let fx = Fixture::new();
    fx.write_live("main.py", "v1");

    let snapshot = fx.manager.create_snapshot("rev-2").await.unwrap().unwrap();
    assert_eq!(snapshot.replaced_by.as_deref(), Some("rev-2"));
    assert!(!fx.live().exists());
    assert_eq!(read(&fx.slot().join("main.py")), "v1");

    // A half-written new deployment
    fx.write_live("main.py", "v2-partial");

    let restored = fx.manager.restore_snapshot().await.unwrap();
    assert_eq!(restored.replaced_by.as_deref(), Some("rev-2"));
    assert_eq!(read(&fx.live().join("main.py")), "v1");
    assert!(!fx.slot().exists());
    assert!(!fx.live().join(".rollguard-snapshot.json").exists());
}

#[tokio::test]
async fn test_second_restore_reports_no_backup_and_keeps_live() {
    let fx = Fixture::new();
    fx.write_live("main.py", "v1");
    fx.manager.create_snapshot("rev-2").await.unwrap();
    fx.manager.restore_snapshot().await.unwrap();

    let second = fx.manager.restore_snapshot().await;
    assert!(matches!(second, Err(ControllerError::NoBackupAvailable)));
    assert_eq!(read(&fx.live().join("main.py")), "v1");
}

#[tokio::test]
async fn test_new_snapshot_replaces_old_backup() {
    let fx = Fixture::new();
    fx.write_live("main.py", "v1");
    fx.write_live("only-in-v1.txt", "old");
    fx.manager.create_snapshot("rev-2").await.unwrap();

    fx.write_live("main.py", "v2");
    fx.manager.create_snapshot("rev-3").await.unwrap();

    // Exactly one slot, holding v2 and nothing merged from v1
    assert_eq!(read(&fx.slot().join("main.py")), "v2");
    assert!(!fx.slot().join("only-in-v1.txt").exists());

    let entries: Vec<String> = fs::read_dir(fx.dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["app-backup".to_string()]);
}

#[tokio::test]
async fn test_locked_slot_blocks_snapshot_and_restore() {
    let fx = Fixture::new();
    fx.write_live("main.py", "v1");
    fx.manager.create_snapshot("rev-2").await.unwrap();
    fx.write_live("main.py", "v2");

    fs::create_dir(fx.dir.path().join("app-backup.lock")).unwrap();

    let snapshot = fx.manager.create_snapshot("rev-3").await;
    assert!(matches!(snapshot, Err(ControllerError::Backup(_))));
    let restore = fx.manager.restore_snapshot().await;
    assert!(matches!(restore, Err(ControllerError::Backup(_))));

    // Neither call touched the tree
    assert_eq!(read(&fx.live().join("main.py")), "v2");
    assert_eq!(read(&fx.slot().join("main.py")), "v1");
}

#[tokio::test]
async fn test_carry_forward_preserved_files() {
    let fx = Fixture::new();
    fx.write_live("config.yaml", "api_key: live");
    fx.write_live("data/trading.db", "positions");
    fx.write_live("main.py", "v1");
    fx.manager.create_snapshot("rev-2").await.unwrap();

    fx.write_live("config.yaml", "api_key: CHANGEME");
    fx.write_live("main.py", "v2");

    let preserve = vec![
        "config.yaml".to_string(),
        "data/trading.db".to_string(),
        "missing.txt".to_string(),
    ];
    let copied = fx.manager.carry_forward(&preserve).await.unwrap();

    assert_eq!(copied, vec!["config.yaml", "data/trading.db"]);
    assert_eq!(read(&fx.live().join("config.yaml")), "api_key: live");
    assert_eq!(read(&fx.live().join("data/trading.db")), "positions");
    assert_eq!(read(&fx.live().join("main.py")), "v2");
}

#[tokio::test]
async fn test_carry_forward_without_backup_is_empty() {
    let fx = Fixture::new();
    fx.write_live("main.py", "v1");
    let copied = fx
        .manager
        .carry_forward(&["config.yaml".to_string()])
        .await
        .unwrap();
    assert!(copied.is_empty());
}
