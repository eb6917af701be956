//! Logging and metrics for the query service

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, QueryTracker, SlowQuery, SlowQueryLogger};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
