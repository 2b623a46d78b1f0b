/*!
 * Runtime Configuration
 *
 * Heap and scheduler settings with desktop/embedded presets,
 * JSON loading and environment overrides.
 */

use super::errors::ConfigError;
use super::limits;
use super::types::Micros;
use serde::{Deserialize, Serialize};

/// Object heap and external memory limits for one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HeapConfig {
    /// Soft limit on externally allocated bytes
    pub external_limit: usize,
    /// Hard ceiling on object plus external bytes (`None` = unlimited)
    pub max_heap_size: Option<usize>,
    /// Granularity used when reporting heap blocks
    pub block_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            external_limit: limits::DEFAULT_EXTERNAL_LIMIT,
            max_heap_size: None,
            block_size: limits::BLOCK_SIZE,
        }
    }
}

impl HeapConfig {
    /// Configuration for constrained-memory targets
    pub const fn embedded() -> Self {
        Self {
            external_limit: limits::EMBEDDED_EXTERNAL_LIMIT,
            max_heap_size: Some(limits::EMBEDDED_MAX_HEAP_SIZE),
            block_size: limits::BLOCK_SIZE,
        }
    }

    /// No limits at all (useful for testing)
    pub const fn unlimited() -> Self {
        Self {
            external_limit: usize::MAX,
            max_heap_size: None,
            block_size: limits::BLOCK_SIZE,
        }
    }

    #[must_use]
    pub fn with_external_limit(mut self, bytes: usize) -> Self {
        self.external_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = Some(bytes);
        self
    }
}

/// Scheduler time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Run time after which a process is asked to yield
    pub time_slice_us: Micros,
    /// Unyielded run time after which the watchdog fires
    pub watchdog_budget_us: Micros,
    /// Number of scheduler threads the embedder intends to run
    pub threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_slice_us: limits::DEFAULT_TIME_SLICE_US,
            watchdog_budget_us: limits::DEFAULT_WATCHDOG_BUDGET_US,
            threads: limits::DEFAULT_SCHEDULER_THREADS,
        }
    }
}

impl SchedulerConfig {
    /// Single-threaded configuration for embedded targets
    pub const fn embedded() -> Self {
        Self {
            time_slice_us: limits::DEFAULT_TIME_SLICE_US,
            watchdog_budget_us: limits::DEFAULT_WATCHDOG_BUDGET_US,
            threads: 1,
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RuntimeConfig {
    pub heap: HeapConfig,
    pub scheduler: SchedulerConfig,
}

impl RuntimeConfig {
    pub const fn embedded() -> Self {
        Self {
            heap: HeapConfig::embedded(),
            scheduler: SchedulerConfig::embedded(),
        }
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `VM_MAX_HEAP_SIZE` and `VM_EXTERNAL_LIMIT` overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VM_MAX_HEAP_SIZE") {
            self.heap.max_heap_size = Some(parse_bytes("VM_MAX_HEAP_SIZE", &value)?);
        }
        if let Some(value) = lookup("VM_EXTERNAL_LIMIT") {
            self.heap.external_limit = parse_bytes("VM_EXTERNAL_LIMIT", &value)?;
        }
        Ok(self)
    }
}

fn parse_bytes(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
