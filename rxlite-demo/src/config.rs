use rxlite::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    pub interval_ms: u64,
    pub timer_delay_ms: u64,
    /// Time the filter predicate spends on each task
    pub filter_delay_ms: u64,
    pub run_for_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timer_delay_ms: 2000,
            filter_delay_ms: 1000,
            run_for_ms: 8000,
        }
    }
}

impl DemoSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timer_delay(&self) -> Duration {
        Duration::from_millis(self.timer_delay_ms)
    }

    pub fn filter_delay(&self) -> Duration {
        Duration::from_millis(self.filter_delay_ms)
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}

impl DemoConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: DemoConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
