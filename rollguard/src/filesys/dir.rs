//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ControllerError;

/// A local directory
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and its parents
    pub async fn create(&self) -> Result<(), ControllerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }
}
