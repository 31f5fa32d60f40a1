//! Recovery module

pub mod actions;
pub mod escalator;
pub mod remedy;

pub use actions::{RecoveryActions, TargetRecovery};
pub use escalator::{EscalatorOptions, RecoveryEscalator};
pub use remedy::Remedy;
