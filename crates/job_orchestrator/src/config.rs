//! TOML-deserialized process configuration (§13). Every field has a
//! built-in default matching [`job_manager::ManagerConfig::default`];
//! CLI flags override the config file, which overrides these defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

fn default_cache_poll_interval_secs() -> u64 {
    2
}
fn default_cache_ticket_duration_secs() -> u64 {
    10
}
fn default_executor_poll_interval_secs() -> u64 {
    30
}
fn default_executor_ticket_duration_secs() -> u64 {
    120
}
fn default_max_concurrent_jobs() -> usize {
    6
}
fn default_startup_delay_secs() -> u64 {
    10
}
fn default_scheduled_removal_delay_secs() -> u64 {
    120
}
fn default_processing_retry_limit() -> u32 {
    2
}
fn default_cache_poll_error_limit() -> u32 {
    100
}
fn default_executor_poll_error_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    #[serde(rename = "poll_interval_secs", default = "default_cache_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(rename = "ticket_duration_secs", default = "default_cache_ticket_duration_secs")]
    pub ticket_duration_secs: u64,
    /// Connection string for a networked cache backend. The core only
    /// depends on the `JobCache` trait; this crate currently wires the
    /// embedded `InMemoryJobCache` regardless of this value; it is kept
    /// in the schema so a future networked backend can be selected by
    /// scheme without another config-format migration.
    pub backend_url: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_cache_poll_interval_secs(),
            ticket_duration_secs: default_cache_ticket_duration_secs(),
            backend_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    #[serde(rename = "poll_interval_secs", default = "default_executor_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(rename = "ticket_duration_secs", default = "default_executor_ticket_duration_secs")]
    pub ticket_duration_secs: u64,
    pub endpoint: Option<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_executor_poll_interval_secs(),
            ticket_duration_secs: default_executor_ticket_duration_secs(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    pub endpoint: Option<String>,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self { endpoint: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(rename = "startup_delay_secs", default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    #[serde(rename = "scheduled_removal_delay_secs", default = "default_scheduled_removal_delay_secs")]
    pub scheduled_removal_delay_secs: u64,
    #[serde(default = "default_processing_retry_limit")]
    pub processing_retry_limit: u32,
    #[serde(default = "default_cache_poll_error_limit")]
    pub cache_poll_error_limit: u32,
    #[serde(default = "default_executor_poll_error_limit")]
    pub executor_poll_error_limit: u32,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            startup_delay_secs: default_startup_delay_secs(),
            scheduled_removal_delay_secs: default_scheduled_removal_delay_secs(),
            processing_retry_limit: default_processing_retry_limit(),
            cache_poll_error_limit: default_cache_poll_error_limit(),
            executor_poll_error_limit: default_executor_poll_error_limit(),
        }
    }
}

/// The TOML-shaped config file (§13). `log_dir` lives at the top level
/// rather than nested, matching the reference binaries' flat
/// `[logging]`-free top-level fields for process-wide concerns.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheSection,
    pub executor: ExecutorSection,
    pub metadata: MetadataSection,
    pub manager: ManagerSection,
    pub log_dir: Option<String>,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheSection::default(),
            executor: ExecutorSection::default(),
            metadata: MetadataSection::default(),
            manager: ManagerSection::default(),
            log_dir: None,
            verbose: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?;
        Ok(config)
    }

    pub fn to_manager_config(&self) -> job_manager::ManagerConfig {
        job_manager::ManagerConfig {
            cache_poll_interval: Duration::from_secs(self.cache.poll_interval_secs),
            cache_ticket_duration: Duration::from_secs(self.cache.ticket_duration_secs),
            executor_poll_interval: Duration::from_secs(self.executor.poll_interval_secs),
            executor_ticket_duration: Duration::from_secs(self.executor.ticket_duration_secs),
            max_concurrent_jobs: self.manager.max_concurrent_jobs,
            startup_delay: Duration::from_secs(self.manager.startup_delay_secs),
            scheduled_removal_delay: Duration::from_secs(self.manager.scheduled_removal_delay_secs),
            processing_retry_limit: self.manager.processing_retry_limit,
            cache_poll_error_limit: self.manager.cache_poll_error_limit,
            executor_poll_error_limit: self.manager.executor_poll_error_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_manager_config_defaults() {
        let config = AppConfig::default();
        let manager_config = config.to_manager_config();
        let expected = job_manager::ManagerConfig::default();
        assert_eq!(manager_config.cache_poll_interval, expected.cache_poll_interval);
        assert_eq!(manager_config.max_concurrent_jobs, expected.max_concurrent_jobs);
        assert_eq!(manager_config.processing_retry_limit, expected.processing_retry_limit);
    }

    #[test]
    fn partial_toml_fills_in_remaining_defaults() {
        let toml_text = r#"
            [manager]
            max_concurrent_jobs = 12
        "#;
        let config: AppConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.manager.max_concurrent_jobs, 12);
        assert_eq!(config.manager.processing_retry_limit, default_processing_retry_limit());
        assert_eq!(config.cache.poll_interval_secs, default_cache_poll_interval_secs());
    }
}
