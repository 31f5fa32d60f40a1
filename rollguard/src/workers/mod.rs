//! Background polling workers

pub mod monitor;
pub mod poller;

pub use monitor::{MonitorOptions, WorkflowMonitor};
