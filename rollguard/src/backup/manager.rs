//! Backup manager
//!
//! Owns the single backup slot on the target. The live path and the slot are
//! only ever swapped with `mv`, so a restore is one rename and never a merge.
//! Other components go through this type and never see the slot path.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::ControllerError;
use crate::models::snapshot::Snapshot;
use crate::remote::RemoteExecutor;
use crate::utils::shell_quote;

/// Snapshot metadata, stored inside the slot
const SNAPSHOT_META: &str = ".rollguard-snapshot.json";

const EXIT_RESTORE_LOCKED: i32 = 10;
const EXIT_NOTHING_LIVE: i32 = 11;
const EXIT_LOW_DISK: i32 = 12;
const EXIT_NO_BACKUP: i32 = 20;
const EXIT_RESTORE_IN_PROGRESS: i32 = 21;
const EXIT_NO_SLOT: i32 = 30;

/// Demote any previous backup, then move the live tree into the slot
const CREATE_SCRIPT: &str = r#"set -e
if [ -d "$SLOT.lock" ]; then echo "backup slot locked by an in-flight restore" >&2; exit 10; fi
if [ ! -d "$LIVE" ]; then exit 11; fi
avail=$(df -Pk "$(dirname "$LIVE")" | awk 'NR==2 {print $4}')
if [ -n "$avail" ] && [ "$avail" -lt "$MIN_FREE_KB" ]; then echo "only ${avail}KB free" >&2; exit 12; fi
rev=$(git -C "$LIVE" rev-parse HEAD 2>/dev/null || echo unknown)
if [ -d "$SLOT" ]; then rm -rf "$SLOT.discard"; mv "$SLOT" "$SLOT.discard"; fi
if ! mv "$LIVE" "$SLOT"; then
  if [ -d "$SLOT.discard" ]; then mv "$SLOT.discard" "$SLOT"; fi
  echo "could not move live tree into backup slot" >&2
  exit 13
fi
rm -rf "$SLOT.discard"
echo "$rev""#;

/// Move the slot back over the live path
const RESTORE_SCRIPT: &str = r#"set -e
if [ ! -d "$SLOT" ]; then exit 20; fi
if ! mkdir "$SLOT.lock" 2>/dev/null; then echo "restore already in progress" >&2; exit 21; fi
trap 'rmdir "$SLOT.lock"' EXIT
rm -rf "$LIVE"
mv "$SLOT" "$LIVE"
if [ -f "$LIVE/$META" ]; then cat "$LIVE/$META"; rm -f "$LIVE/$META"; fi"#;

/// Manages the live path and its single backup slot
pub struct BackupManager {
    exec: Arc<dyn RemoteExecutor>,
    live_path: String,
    slot_path: String,
    min_free_kb: u64,
}

impl BackupManager {
    pub fn new(
        exec: Arc<dyn RemoteExecutor>,
        live_path: impl Into<String>,
        slot_path: impl Into<String>,
        min_free_kb: u64,
    ) -> Self {
        Self {
            exec,
            live_path: live_path.into(),
            slot_path: slot_path.into(),
            min_free_kb,
        }
    }

    fn prelude(&self) -> String {
        format!(
            "LIVE={}\nSLOT={}\nMETA={}\nMIN_FREE_KB={}\n",
            shell_quote(&self.live_path),
            shell_quote(&self.slot_path),
            SNAPSHOT_META,
            self.min_free_kb
        )
    }

    /// Snapshot the live tree before a new revision is written.
    ///
    /// Returns `None` when nothing is deployed yet (first-ever deployment).
    pub async fn create_snapshot(
        &self,
        incoming_revision: &str,
    ) -> Result<Option<Snapshot>, ControllerError> {
        info!(revision = %incoming_revision, "Creating snapshot of live tree");

        let script = format!("{}{}", self.prelude(), CREATE_SCRIPT);
        let output = self
            .exec
            .exec(&script)
            .await
            .map_err(|e| ControllerError::Backup(e.to_string()))?;

        match output.exit_code {
            0 => {}
            EXIT_NOTHING_LIVE => {
                warn!(path = %self.live_path, "Nothing deployed yet, no snapshot taken");
                return Ok(None);
            }
            EXIT_RESTORE_LOCKED => {
                return Err(ControllerError::Backup(
                    "backup slot is locked by an in-flight restore".to_string(),
                ))
            }
            EXIT_LOW_DISK => {
                return Err(ControllerError::Backup(format!(
                    "insufficient disk space: {}",
                    output.stderr.trim()
                )))
            }
            _ => return Err(ControllerError::Backup(output.failure_message())),
        }

        let snapshot = Snapshot {
            path: self.slot_path.clone(),
            taken_at: Utc::now(),
            source_revision: output
                .stdout
                .lines()
                .last()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            replaced_by: Some(incoming_revision.to_string()),
        };

        // Metadata is informational; a snapshot without it still restores
        let meta = serde_json::to_string(&snapshot)?;
        let write_meta = format!(
            "{}printf '%s' {} > \"$SLOT/$META\"",
            self.prelude(),
            shell_quote(&meta)
        );
        match self.exec.exec(&write_meta).await {
            Ok(out) if out.success() => {}
            Ok(out) => warn!("Could not write snapshot metadata: {}", out.failure_message()),
            Err(e) => warn!("Could not write snapshot metadata: {}", e),
        }

        info!(source_revision = %snapshot.source_revision, "Snapshot taken");
        Ok(Some(snapshot))
    }

    /// Move the backup slot back into the live path.
    ///
    /// The slot is consumed: a second call fails with `NoBackupAvailable`
    /// and leaves the live path alone.
    pub async fn restore_snapshot(&self) -> Result<Snapshot, ControllerError> {
        info!(path = %self.live_path, "Restoring snapshot");

        let script = format!("{}{}", self.prelude(), RESTORE_SCRIPT);
        let output = self
            .exec
            .exec(&script)
            .await
            .map_err(|e| ControllerError::Backup(e.to_string()))?;

        match output.exit_code {
            0 => {}
            EXIT_NO_BACKUP => return Err(ControllerError::NoBackupAvailable),
            EXIT_RESTORE_IN_PROGRESS => {
                return Err(ControllerError::Backup(
                    "another restore is in progress".to_string(),
                ))
            }
            _ => return Err(ControllerError::Backup(output.failure_message())),
        }

        let snapshot = serde_json::from_str::<Snapshot>(output.stdout.trim()).unwrap_or_else(|_| {
            debug!("Snapshot metadata missing, restoring without it");
            Snapshot {
                path: self.slot_path.clone(),
                taken_at: Utc::now(),
                source_revision: "unknown".to_string(),
                replaced_by: None,
            }
        });

        info!(source_revision = %snapshot.source_revision, "Snapshot restored");
        Ok(snapshot)
    }

    /// Whether the backup slot is occupied
    pub async fn has_backup(&self) -> Result<bool, ControllerError> {
        let output = self
            .exec
            .exec(&format!("{}test -d \"$SLOT\"", self.prelude()))
            .await?;
        Ok(output.success())
    }

    /// Copy preserved files from the backup slot into the freshly written live tree.
    ///
    /// Returns the paths that were copied. Missing files are skipped.
    pub async fn carry_forward(&self, preserve: &[String]) -> Result<Vec<String>, ControllerError> {
        if preserve.is_empty() {
            return Ok(Vec::new());
        }

        let mut script = self.prelude();
        script.push_str("set -e\nif [ ! -d \"$SLOT\" ]; then exit 30; fi\n");
        for file in preserve {
            let quoted = shell_quote(file);
            script.push_str(&format!(
                "if [ -e \"$SLOT\"/{f} ]; then mkdir -p \"$(dirname \"$LIVE\"/{f})\"; rm -rf \"$LIVE\"/{f}; cp -a \"$SLOT\"/{f} \"$LIVE\"/{f}; echo {f}; fi\n",
                f = quoted
            ));
        }

        let output = self
            .exec
            .exec(&script)
            .await
            .map_err(|e| ControllerError::Backup(e.to_string()))?;

        match output.exit_code {
            0 => {
                let copied: Vec<String> = output.stdout.lines().map(str::to_string).collect();
                debug!(count = copied.len(), "Preserved files carried forward");
                Ok(copied)
            }
            EXIT_NO_SLOT => {
                warn!("No backup slot to carry preserved files from");
                Ok(Vec::new())
            }
            _ => Err(ControllerError::Backup(output.failure_message())),
        }
    }
}
