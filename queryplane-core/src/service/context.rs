//! Per-service context handed to the worker at construction

use crate::config::LoggingSettings;
use crate::monitoring::{ServiceMetrics, SlowQueryLogger};
use std::sync::Arc;

/// Naming and diagnostics shared by a service handle and its worker
#[derive(Debug, Clone)]
pub struct ServiceContext {
    node_name: Arc<str>,
    metrics: Arc<ServiceMetrics>,
    slow_queries: SlowQueryLogger,
}

impl ServiceContext {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self::with_logging(node_name, &LoggingSettings::default())
    }

    pub fn with_logging(node_name: impl Into<String>, settings: &LoggingSettings) -> Self {
        Self {
            node_name: Arc::from(node_name.into()),
            metrics: Arc::new(ServiceMetrics::new()),
            slow_queries: SlowQueryLogger::from_settings(settings),
        }
    }

    pub fn with_slow_query_logger(mut self, logger: SlowQueryLogger) -> Self {
        self.slow_queries = logger;
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub fn slow_queries(&self) -> &SlowQueryLogger {
        &self.slow_queries
    }
}
