//! Deployment module

pub mod executor;
pub mod fsm;
pub mod git;
pub mod pm2;

use async_trait::async_trait;

use crate::errors::ControllerError;
use crate::models::snapshot::Snapshot;

/// Publishes a revision to the branch CI watches
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, revision: &str, branch: &str) -> Result<(), ControllerError>;
}

/// Snapshots the live tree and deploys a revision over it
#[async_trait]
pub trait Release: Send + Sync {
    async fn release(&self, revision: &str, branch: &str) -> Result<Option<Snapshot>, ControllerError>;
}
