//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ControllerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Where the controller keeps its own files on the machine it runs on
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the directories the controller writes to
    pub async fn setup(&self) -> Result<(), ControllerError> {
        self.logs_dir().create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        // /etc/rollguard on Linux, the home directory elsewhere
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/rollguard");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rollguard");

        Self::new(base_dir)
    }
}
