//! Structured logging with tracing
//!
//! Installs the global subscriber and keeps a bounded log of slow queries.

use crate::config::{LogFormat, LoggingSettings};
use crate::query::PlanSummary;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Number of slow queries kept for reporting
const SLOW_QUERY_HISTORY: usize = 1000;

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));

    let subscriber = Registry::default().with(env_filter);

    match settings.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_thread_names(true);
            subscriber
                .with(json_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install JSON subscriber: {}", e))?;
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .compact();
            subscriber
                .with(fmt_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?;
        }
    }

    tracing::info!(
        "Logging initialized: level={}, format={:?}, slow_queries={}",
        settings.level.as_str(),
        settings.format,
        settings.slow_query_logging
    );

    Ok(())
}

/// Slow query record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQuery {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Node that evaluated the query
    pub node: String,
    pub summary: PlanSummary,
}

/// Query execution tracker
pub struct QueryTracker {
    start_time: Instant,
}

impl QueryTracker {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Slow query logger
#[derive(Debug, Clone)]
pub struct SlowQueryLogger {
    threshold: Duration,
    enabled: bool,
    queries: Arc<RwLock<Vec<SlowQuery>>>,
}

impl SlowQueryLogger {
    /// Create a new slow query logger
    pub fn new(threshold: Duration, enabled: bool) -> Self {
        Self {
            threshold,
            enabled,
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self::new(settings.slow_query_threshold(), settings.slow_query_logging)
    }

    /// Start tracking a query
    pub fn start_query(&self) -> QueryTracker {
        QueryTracker {
            start_time: Instant::now(),
        }
    }

    /// Finish tracking a query and log if slow
    pub fn finish_query(&self, tracker: QueryTracker, node: &str, summary: &PlanSummary) {
        if !self.enabled {
            return;
        }

        let duration = tracker.elapsed();
        if duration < self.threshold {
            return;
        }

        let slow_query = SlowQuery {
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            node: node.to_string(),
            summary: summary.clone(),
        };

        tracing::warn!(
            target: "slow_query",
            duration_ms = slow_query.duration_ms,
            node = %slow_query.node,
            terms = summary.terms,
            candidates = summary.candidates,
            full_scan = summary.full_scan,
            "Slow query detected"
        );

        let mut queries = self.queries.write();
        queries.push(slow_query);

        if queries.len() > SLOW_QUERY_HISTORY {
            let len = queries.len();
            queries.drain(0..len - SLOW_QUERY_HISTORY);
        }
    }

    /// Get recent slow queries, newest first
    pub fn get_slow_queries(&self, limit: usize) -> Vec<SlowQuery> {
        let queries = self.queries.read();
        queries.iter().rev().take(limit).cloned().collect()
    }

    /// Clear slow query history
    pub fn clear(&self) {
        self.queries.write().clear();
    }
}
