//! Configuration for the coordinator and its worker pool

use serde::{Deserialize, Serialize};

/// Configuration for worker pool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of tasks executing concurrently.
    /// `None` means one slot per task in the batch.
    pub max_parallel: Option<usize>,
    /// Retry attempts per task after the initial failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Simulated remote-call latency per task (in milliseconds)
    pub task_latency_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            task_latency_ms: None,
        }
    }
}

/// Configuration for the job coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on the mapper count a caller may request
    #[serde(default = "default_max_mappers")]
    pub max_mappers: usize,
    /// Worker pool settings shared by the map and reduce phases
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_max_mappers() -> usize {
    64
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_mappers: default_max_mappers(),
            pool: PoolConfig::default(),
        }
    }
}
