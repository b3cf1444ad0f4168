//! The two periodic ticks that drive the manager: a cache poll over the
//! "update set" (§4.6 "Cache poll") that also runs admission control, and
//! an executor poll over the "running set" (§4.6 "Executor poll").

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use job_protocol::CacheStatus;
use rand::Rng;
use tracing::{instrument, warn};

use crate::context::ManagerContext;
use crate::dispatch::next_operation;
use crate::execute;

const RUNNING_SET_STATUSES: &[CacheStatus] = &[
    CacheStatus::LaunchScheduled,
    CacheStatus::SentToExecutor,
    CacheStatus::QueuedInExecutor,
    CacheStatus::RunningInExecutor,
];

const EXECUTOR_FACING_STATUSES: &[CacheStatus] = &[
    CacheStatus::SentToExecutor,
    CacheStatus::QueuedInExecutor,
    CacheStatus::RunningInExecutor,
];

/// Idle-tick jitter shape, ported from the reference dispatch loop's
/// `DISPATCH_BACKOFF_*` constants. §4.6 only specifies a fixed poll
/// interval; this only adds a small random delay on top of a tick that
/// found nothing to dispatch, to avoid every replica in a fleet hammering
/// the cache in lockstep.
const IDLE_BACKOFF_BASE_MS: u64 = 50;
const IDLE_BACKOFF_JITTER_MS: u64 = 50;

async fn idle_jitter() {
    let extra = rand::thread_rng().gen_range(0..=IDLE_BACKOFF_JITTER_MS);
    tokio::time::sleep(Duration::from_millis(IDLE_BACKOFF_BASE_MS + extra)).await;
}

/// Dispatches every update-set job's next operation, then runs admission
/// control: count the running set (including jobs another replica is
/// mid-`scheduleLaunch` on), and admit the first `available` entries of
/// the launchable set, FIFO by arrival order (§4.6 steps 1-4, §9 open
/// question 2 on `LAUNCH_SCHEDULED` counting against the limit).
#[instrument(skip(ctx))]
pub async fn cache_poll_tick(ctx: &ManagerContext) {
    let update_statuses: Vec<CacheStatus> = CacheStatus::ALL
        .iter()
        .copied()
        .filter(|s| s.is_update_set() && *s != CacheStatus::QueuedInTrac)
        .collect();

    let update_set_had_work = match ctx.cache.query_state(&update_statuses, false).await {
        Ok(rows) => {
            let had_work = !rows.is_empty();
            for row in rows {
                let Some(operation) = next_operation(row.status) else {
                    continue;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        execute::dispatch_and_chase(&ctx, row.key.clone(), row.revision, operation).await
                    {
                        warn!(job_key = row.key.as_str(), %err, "cache-driven dispatch failed");
                    }
                });
            }
            had_work
        }
        Err(err) => {
            warn!(%err, "cache poll: query_state(update set) failed");
            if !err.is_transient() {
                ctx.metrics.cache_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };

    let running = match ctx.cache.query_state(RUNNING_SET_STATUSES, true).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "cache poll: query_state(running set) failed");
            if !err.is_transient() {
                ctx.metrics.cache_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };
    ctx.metrics
        .running_set_size
        .store(running.len() as i64, Ordering::Relaxed);

    let available = ctx.config.max_concurrent_jobs.saturating_sub(running.len());
    if available == 0 {
        if !update_set_had_work {
            idle_jitter().await;
        }
        return;
    }

    let mut launchable = match ctx
        .cache
        .query_state(&[CacheStatus::QueuedInTrac], false)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "cache poll: query_state(launchable set) failed");
            if !err.is_transient() {
                ctx.metrics.cache_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };
    launchable.sort_by_key(|row| row.sequence);

    if !update_set_had_work && launchable.is_empty() {
        idle_jitter().await;
    }

    for row in launchable.into_iter().take(available) {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = execute::dispatch_and_chase(
                &ctx,
                row.key.clone(),
                row.revision,
                crate::dispatch::Operation::ScheduleLaunch,
            )
            .await
            {
                warn!(job_key = row.key.as_str(), %err, "admission dispatch failed");
            }
        });
    }
}

/// Polls the executor for every job it currently holds, then folds each
/// observation back into the cache (§4.2 `pollMany`, §4.5
/// `recordJobStatus`).
#[instrument(skip(ctx))]
pub async fn executor_poll_tick(ctx: &ManagerContext) {
    let rows = match ctx.cache.query_state(EXECUTOR_FACING_STATUSES, false).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "executor poll: query_state failed");
            if !err.is_transient() {
                ctx.metrics.executor_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };
    if rows.is_empty() {
        return;
    }

    let mut revisions = HashMap::with_capacity(rows.len());
    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        match ctx.cache.get_latest_entry(&row.key).await {
            Ok(Some((state, revision, _status))) => {
                if let Some(batch_state) = state.batch_state {
                    jobs.push((row.key.clone(), batch_state));
                    revisions.insert(row.key, revision);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(job_key = row.key.as_str(), %err, "executor poll: get_latest_entry failed");
            }
        }
    }
    if jobs.is_empty() {
        return;
    }

    match ctx.executor.poll_many(&jobs).await {
        Ok(infos) => {
            for info in infos {
                let Some(&revision) = revisions.get(&info.job_key) else {
                    continue;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let key = info.job_key.clone();
                    if let Err(err) =
                        execute::dispatch_record_job_status(&ctx, key.clone(), revision, &info).await
                    {
                        warn!(job_key = key.as_str(), %err, "recordJobStatus dispatch failed");
                    }
                });
            }
        }
        Err(err) => {
            warn!(%err, "executor poll: poll_many failed");
            if !err.is_transient() {
                ctx.metrics.executor_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Sweeps `SCHEDULED_TO_REMOVE` jobs whose `removal_deadline` has passed
/// and deletes them from the cache (§4.5 `removeFromCache`). Runs on the
/// same cadence as the cache poll; there is no separate interval in the
/// configuration for it.
#[instrument(skip(ctx))]
pub async fn removal_sweep_tick(ctx: &ManagerContext) {
    let rows = match ctx
        .cache
        .query_state(&[CacheStatus::ScheduledToRemove], false)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            warn!(%err, "removal sweep: query_state failed");
            if !err.is_transient() {
                ctx.metrics.cache_poll_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
    };

    let now = chrono::Utc::now();
    for row in rows {
        let due = match ctx.cache.get_latest_entry(&row.key).await {
            Ok(Some((state, _, _))) => state.removal_deadline.map(|deadline| deadline <= now).unwrap_or(true),
            Ok(None) => false,
            Err(err) => {
                warn!(job_key = row.key.as_str(), %err, "removal sweep: get_latest_entry failed");
                false
            }
        };
        if !due {
            continue;
        }
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = execute::remove_from_cache(&ctx, row.key.clone(), row.revision).await {
                warn!(job_key = row.key.as_str(), %err, "removeFromCache failed");
            }
        });
    }
}
