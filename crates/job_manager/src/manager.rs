//! Public entrypoint (C6): `addNewJob`/`queryJob` (§6) and the `run` loop
//! that drives the two pollers, modeled on the reference daemon's
//! `select!`-over-timers-and-shutdown pattern.

use chrono::Utc;
use job_cache::JobCache;
use job_protocol::{CacheStatus, JobKey, JobState};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::context::ManagerContext;
use crate::error::JobManagerError;
use crate::poller;

/// Owns a [`ManagerContext`] and exposes the job-orchestration API over
/// it. Cheap to clone (everything inside is an `Arc`), so a binary can
/// hand a clone to an HTTP/RPC layer while `run` drives the pollers on
/// its own task.
#[derive(Clone)]
pub struct JobManager {
    ctx: ManagerContext,
}

impl JobManager {
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    /// §6 `addNewJob`: the only call where errors are surfaced
    /// synchronously to the submitter. Saves the job's own metadata
    /// object (assigning `jobId`/`jobKey`), then admits it into the cache
    /// at `QUEUED_IN_TRAC`.
    #[instrument(skip(self, seed), fields(tenant = %seed.tenant))]
    pub async fn add_new_job(&self, seed: JobState) -> Result<JobState, JobManagerError> {
        let now = Utc::now();
        let state = job_processor::save_initial_metadata(seed, self.ctx.metadata.as_ref(), now).await?;
        let job_key = state
            .job_key
            .clone()
            .ok_or_else(|| JobManagerError::Internal("saveInitialMetadata did not assign a job key".into()))?;

        let ticket = self
            .ctx
            .cache
            .open_new_ticket(&job_key, self.ctx.config.cache_ticket_duration)
            .await?;
        if ticket.superseded() {
            self.ctx.cache.close(ticket).await.ok();
            return Err(JobManagerError::DuplicateJob(job_key.to_string()));
        }

        let add_result = self
            .ctx
            .cache
            .add_entry(&ticket, CacheStatus::QueuedInTrac, state.clone())
            .await;
        self.ctx.cache.close(ticket).await.ok();
        add_result?;

        Ok(state)
    }

    /// §6 `queryJob`: a lock-free read of the latest committed state.
    pub async fn query_job(&self, key: &JobKey) -> Result<Option<JobState>, JobManagerError> {
        let entry = self.ctx.cache.get_latest_entry(key).await?;
        Ok(entry.map(|(state, _revision, _status)| state))
    }

    /// Drives both pollers and the removal sweep until `cancellation` is
    /// triggered, matching the reference daemon's `select!`-over-interval-
    /// timers-and-shutdown shape. Waits `startup_delay` before the first
    /// tick so a freshly started replica doesn't race an in-flight
    /// rolling deploy.
    ///
    /// Returns the reason the loop stopped. §4.6/§7's "repeated internal
    /// errors in the polling loops ... the process exits, relying on an
    /// external supervisor to restart" is this crate's business, not the
    /// binary's: `run` itself breaks out once a poll error counter
    /// crosses its configured limit, rather than leaving that decision to
    /// whatever happens to call it. The binary crate still chooses the
    /// process exit code from the returned reason.
    pub async fn run(&self, cancellation: CancellationToken) -> RunExit {
        tokio::time::sleep(self.ctx.config.startup_delay).await;
        info!("job manager starting poll loop");

        let mut cache_interval = tokio::time::interval(self.ctx.config.cache_poll_interval);
        let mut executor_interval = tokio::time::interval(self.ctx.config.executor_poll_interval);
        cache_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        executor_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("shutdown signal received, stopping poll loop");
                    return RunExit::Shutdown;
                }
                _ = cache_interval.tick() => {
                    poller::cache_poll_tick(&self.ctx).await;
                    poller::removal_sweep_tick(&self.ctx).await;
                    if let Some(reason) = poll_error_limit_exceeded(&self.ctx) {
                        return reason;
                    }
                }
                _ = executor_interval.tick() => {
                    poller::executor_poll_tick(&self.ctx).await;
                    if let Some(reason) = poll_error_limit_exceeded(&self.ctx) {
                        return reason;
                    }
                }
            }
        }
    }
}

/// Why [`JobManager::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The caller's `CancellationToken` was triggered — an ordinary
    /// graceful shutdown.
    Shutdown,
    /// `cachePollErrorLimit` was exceeded (§4.6 "on any unexpected error,
    /// increment a monotonic counter; if it exceeds cachePollErrorLimit
    /// the process terminates").
    CachePollErrorLimitExceeded,
    /// `executorPollErrorLimit` was exceeded (§4.6 "Executor poll", same
    /// policy).
    ExecutorPollErrorLimitExceeded,
}

/// §4.6/§7 "the process gives up and lets its supervisor restart it"
/// once a poll error limit is exceeded.
fn poll_error_limit_exceeded(ctx: &ManagerContext) -> Option<RunExit> {
    let snapshot = ctx.metrics.snapshot();
    if snapshot.cache_poll_errors >= ctx.config.cache_poll_error_limit as u64 {
        tracing::error!(
            errors = snapshot.cache_poll_errors,
            limit = ctx.config.cache_poll_error_limit,
            "cache poll error limit exceeded, stopping poll loop"
        );
        return Some(RunExit::CachePollErrorLimitExceeded);
    }
    if snapshot.executor_poll_errors >= ctx.config.executor_poll_error_limit as u64 {
        tracing::error!(
            errors = snapshot.executor_poll_errors,
            limit = ctx.config.executor_poll_error_limit,
            "executor poll error limit exceeded, stopping poll loop"
        );
        return Some(RunExit::ExecutorPollErrorLimitExceeded);
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use executor_client::ScriptedExecutorClient;
    use job_cache::InMemoryJobCache;
    use job_protocol::{JobType, TenantId};
    use job_type_logic::JobTypeRegistry;
    use metadata_client::InMemoryMetadataClient;
    use serde_json::json;

    use super::*;
    use crate::config::ManagerConfig;

    fn build_manager() -> JobManager {
        let ctx = ManagerContext::new(
            Arc::new(InMemoryJobCache::new()),
            Arc::new(ScriptedExecutorClient::new()),
            Arc::new(InMemoryMetadataClient::new()),
            Arc::new(JobTypeRegistry::new()),
            ManagerConfig::default(),
        );
        JobManager::new(ctx)
    }

    #[tokio::test]
    async fn add_new_job_assigns_a_key_and_admits_into_the_cache() {
        let manager = build_manager();
        let seed = JobState::seed(
            TenantId::from("acme"),
            "alice",
            "token-abc",
            JobType::ImportModel,
            json!({}),
            Utc::now(),
        );
        let state = manager.add_new_job(seed).await.unwrap();
        assert!(state.job_key.is_some());
        assert_eq!(state.cache_status, CacheStatus::QueuedInTrac);

        let fetched = manager.query_job(state.job_key.as_ref().unwrap()).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn query_job_returns_none_for_unknown_key() {
        let manager = build_manager();
        let missing: JobKey = "does-not-exist".to_string().into();
        assert!(manager.query_job(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_stops_with_shutdown_on_cancellation() {
        let mut config = ManagerConfig::default();
        config.startup_delay = std::time::Duration::from_millis(0);
        config.cache_poll_interval = std::time::Duration::from_millis(20);
        config.executor_poll_interval = std::time::Duration::from_secs(60);
        let ctx = ManagerContext::new(
            Arc::new(InMemoryJobCache::new()),
            Arc::new(ScriptedExecutorClient::new()),
            Arc::new(InMemoryMetadataClient::new()),
            Arc::new(JobTypeRegistry::new()),
            config,
        );
        let manager = JobManager::new(ctx);
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            token.cancel();
        });
        assert_eq!(manager.run(cancellation).await, RunExit::Shutdown);
    }

    #[tokio::test]
    async fn run_exits_once_the_cache_poll_error_limit_is_exceeded() {
        let mut config = ManagerConfig::default();
        config.startup_delay = std::time::Duration::from_millis(0);
        config.cache_poll_interval = std::time::Duration::from_millis(10);
        config.executor_poll_interval = std::time::Duration::from_secs(60);
        config.cache_poll_error_limit = 1;
        let ctx = ManagerContext::new(
            Arc::new(InMemoryJobCache::new()),
            Arc::new(ScriptedExecutorClient::new()),
            Arc::new(InMemoryMetadataClient::new()),
            Arc::new(JobTypeRegistry::new()),
            config,
        );
        ctx.metrics.cache_poll_errors.store(1, std::sync::atomic::Ordering::Relaxed);
        let manager = JobManager::new(ctx);
        let cancellation = CancellationToken::new();
        assert_eq!(
            manager.run(cancellation).await,
            RunExit::CachePollErrorLimitExceeded
        );
    }
}
