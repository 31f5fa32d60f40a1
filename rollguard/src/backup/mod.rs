//! Snapshot and restore of the deployed tree

pub mod manager;

pub use manager::BackupManager;
