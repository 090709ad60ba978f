//! Global configuration types for Conductor.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! queue retry policy and database location.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestration engine.
///
/// Loaded from `{data_dir}/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Database URL override. When absent the data-dir default is used.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Retry/backoff policy applied by the task queue manager.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential-backoff policy for failed queue tasks.
///
/// A task's n-th retry is delayed by `base_delay_secs * 2^(n-1)`, capped at
/// `max_delay_secs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    /// Upper bound on any computed delay.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_base_delay_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    3600
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}
