//! Configuration for the query service
//!
//! Settings are grouped in three TOML sections:
//! - `[service]` queue and cancellation behaviour of the worker
//! - `[planner]` index pruning options
//! - `[logging]` log level, format and slow query threshold

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Query service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryServiceConfig {
    /// Worker settings
    pub service: ServiceSettings,
    /// Planner settings
    pub planner: PlannerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Worker thread name
    pub thread_name: String,
    /// Work queue capacity (None for unbounded)
    pub queue_capacity: Option<usize>,
    /// How long a producer may wait for room in a bounded queue
    pub admission_timeout_ms: Option<u64>,
    /// How long a query caller waits for its result (None waits forever)
    pub query_timeout_ms: Option<u64>,
    /// Reaction of an idle worker to an interrupt
    pub interrupt_policy: InterruptPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Skip range terms over hash-ordered values instead of only warning
    pub strict_range_values: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level
    pub level: LogLevel,
    /// Log format
    pub format: LogFormat,
    /// Slow query threshold in milliseconds
    pub slow_query_threshold_ms: u64,
    /// Enable slow query logging
    pub slow_query_logging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPolicy {
    /// Log the interrupt and keep serving
    Continue,
    /// Drain the admitted units and stop the worker
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            thread_name: "query-service".to_string(),
            queue_capacity: None,
            admission_timeout_ms: None,
            query_timeout_ms: None,
            interrupt_policy: InterruptPolicy::Continue,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            slow_query_threshold_ms: 100,
            slow_query_logging: true,
        }
    }
}

impl ServiceSettings {
    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout_ms.map(Duration::from_millis)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

impl LoggingSettings {
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

impl QueryServiceConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QueryServiceConfig =
            toml::from_str(content).context("Invalid query service configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.service.thread_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker thread name cannot be empty"));
        }

        if self.service.queue_capacity == Some(0) {
            return Err(anyhow::anyhow!("Queue capacity cannot be 0"));
        }

        if self.service.admission_timeout_ms.is_some() && self.service.queue_capacity.is_none() {
            return Err(anyhow::anyhow!(
                "Admission timeout requires a bounded queue (set queue_capacity)"
            ));
        }

        if self.service.query_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("Query timeout cannot be 0"));
        }

        Ok(())
    }
}
