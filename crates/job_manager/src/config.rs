use std::time::Duration;

/// Tunables the manager reads once at startup. Defaults match the
/// documented production defaults: a 2s cache poll against a 10s
/// ticket, a 30s executor poll against a 120s ticket, six concurrent
/// jobs, a 10s startup delay, a 120s scheduled-removal delay, two
/// processing retries, and generous poll error limits before the
/// process gives up and lets its supervisor restart it.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub cache_poll_interval: Duration,
    pub cache_ticket_duration: Duration,
    pub executor_poll_interval: Duration,
    pub executor_ticket_duration: Duration,
    pub max_concurrent_jobs: usize,
    pub startup_delay: Duration,
    pub scheduled_removal_delay: Duration,
    pub processing_retry_limit: u32,
    pub cache_poll_error_limit: u32,
    pub executor_poll_error_limit: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_poll_interval: Duration::from_secs(2),
            cache_ticket_duration: Duration::from_secs(10),
            executor_poll_interval: Duration::from_secs(30),
            executor_ticket_duration: Duration::from_secs(120),
            max_concurrent_jobs: 6,
            startup_delay: Duration::from_secs(10),
            scheduled_removal_delay: Duration::from_secs(120),
            processing_retry_limit: 2,
            cache_poll_error_limit: 100,
            executor_poll_error_limit: 20,
        }
    }
}
