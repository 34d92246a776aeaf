pub mod error;
pub mod workload;
pub mod session;
pub mod metrics;
pub mod phase;
pub mod sweep;
pub mod config;
pub mod report;
pub mod chart;
