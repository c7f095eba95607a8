//! Upstream service health probing

pub mod monitor;
pub mod prober;

pub use monitor::{HealthMonitor, HealthReport, Transition};
pub use prober::{overall_status, HealthProber, ProbeTarget, ServiceHealth, ServiceStatus};
