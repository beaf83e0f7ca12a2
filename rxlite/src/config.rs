use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution context configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub worker: WorkerConfig,
    pub affinity: AffinityConfig,
}

/// Worker pool settings (the "io" scheduler)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Prefix for pool thread names
    pub thread_name: String,
    /// Async worker threads driving the runtime
    pub worker_threads: usize,
    /// Upper bound on concurrently blocking tasks
    pub max_blocking_threads: usize,
    /// How long an idle blocking thread is kept around
    pub keep_alive_ms: u64,
}

impl WorkerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "rx-io".to_string(),
            worker_threads: 2,
            max_blocking_threads: 64,
            keep_alive_ms: 60_000,
        }
    }
}

/// Serial affinity context settings (the "main" scheduler)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AffinityConfig {
    pub thread_name: String,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            thread_name: "rx-main".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker.thread_name, "rx-io");
        assert_eq!(config.affinity.thread_name, "rx-main");
        assert_eq!(config.worker.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "worker:\n  max_blocking_threads: 4\n";
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.worker.max_blocking_threads, 4);
        assert_eq!(config.worker.thread_name, "rx-io");
        assert_eq!(config.affinity, AffinityConfig::default());
    }
}
