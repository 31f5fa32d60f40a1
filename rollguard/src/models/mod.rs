//! Data models shared across the controller

pub mod health;
pub mod recovery;
pub mod run;
pub mod snapshot;
pub mod workflow;
