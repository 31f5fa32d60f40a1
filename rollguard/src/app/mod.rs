//! Application wiring and command handlers

pub mod options;
pub mod run;
pub mod state;
