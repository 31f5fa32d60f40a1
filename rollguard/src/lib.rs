//! rollguard library
//!
//! Deployment orchestration for a single long-running service: publish a
//! revision, wait for CI, verify health on the target and recover through
//! self-heal or rollback.

pub mod app;
pub mod backup;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod http;
pub mod logs;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod recovery;
pub mod remote;
pub mod storage;
pub mod utils;
pub mod workers;
