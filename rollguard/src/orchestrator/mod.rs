//! Orchestration module

pub mod controller;

pub use controller::{Controller, ControllerOptions, RunReport};
