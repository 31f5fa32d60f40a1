//! Service health probing

pub mod prober;
pub mod signatures;

pub use prober::{HealthProbe, HealthProber, ProbeSchedule};
