//! Configuration loading for GenOmen.
//! Reads genomen.toml from the current directory or the path in GENOMEN_CONFIG.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GenomenError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

// ── Scheduler ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of requests analysed at the same time.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// How long a request may wait for a worker before it is failed.
    #[serde(default = "default_max_queue_time_secs")]
    pub max_queue_time_secs: u64,
}

fn default_max_concurrent_requests() -> usize { 2 }
fn default_max_queue_time_secs()     -> u64   { 600 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            max_queue_time_secs:     default_max_queue_time_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn max_queue_time(&self) -> Duration {
        Duration::from_secs(self.max_queue_time_secs)
    }
}

// ── Task ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_max_concurrent_analyses")]
    pub max_concurrent_analyses_per_task: usize,
    #[serde(default = "default_max_concurrent_samples")]
    pub max_concurrent_samples_per_task: usize,
    /// Deepest allowed chain of `RULE(id)` calls.
    #[serde(default = "default_max_rule_depth")]
    pub max_rule_depth: usize,
    #[serde(default = "default_task_id_length")]
    pub task_id_length: usize,
    /// Schema that importers write task-scoped data into.
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_max_concurrent_analyses() -> usize  { 2 }
fn default_max_concurrent_samples()  -> usize  { 4 }
fn default_max_rule_depth()          -> usize  { 32 }
fn default_task_id_length()          -> usize  { 10 }
fn default_schema()                  -> String { "TEMP".to_string() }

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses_per_task: default_max_concurrent_analyses(),
            max_concurrent_samples_per_task:  default_max_concurrent_samples(),
            max_rule_depth:                   default_max_rule_depth(),
            task_id_length:                   default_task_id_length(),
            schema:                           default_schema(),
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_report_name")]
    pub name: String,
}

fn default_language()    -> String { "en".to_string() }
fn default_report_name() -> String { "genomen".to_string() }

impl Default for ReportConfig {
    fn default() -> Self {
        Self { language: default_language(), name: default_report_name() }
    }
}


impl Config {
    /// Load configuration from genomen.toml.
    /// Checks GENOMEN_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var("GENOMEN_CONFIG")
            .unwrap_or_else(|_| "genomen.toml".to_string());

        if !Path::new(&path).exists() {
            return Err(GenomenError::Config(format!("Config file not found: {path}")));
        }
        Self::from_path(&path)
    }

    /// Load configuration from an explicit path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        tracing::debug!(path = %path.as_ref().display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler and evaluator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_requests == 0 {
            return Err(GenomenError::Config(
                "scheduler.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.task.max_concurrent_analyses_per_task == 0
            || self.task.max_concurrent_samples_per_task == 0
        {
            return Err(GenomenError::Config(
                "task concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.task.max_rule_depth == 0 {
            return Err(GenomenError::Config("task.max_rule_depth must be at least 1".to_string()));
        }
        if self.task.task_id_length == 0 {
            return Err(GenomenError::Config("task.task_id_length must be at least 1".to_string()));
        }
        Ok(())
    }
}
