//! Runs a single dispatched [`Operation`] against one job: opens the
//! right kind of ticket, runs the matching `job_processor` step, and
//! commits the result through the retry-or-fail wrapper (§4.6).

use std::sync::atomic::Ordering;

use chrono::Utc;
use job_cache::Ticket;
use job_processor::{ProcessorError, Retryable};
use job_protocol::{CacheStatus, JobKey, JobState, TracStatus};
use job_type_logic::RuntimeJobResult;
use tracing::instrument;

use crate::context::ManagerContext;
use crate::dispatch::{Operation, TicketKind};
use crate::error::JobManagerError;

/// What happened when [`dispatch`] ran.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A new revision was committed.
    Applied { new_status: CacheStatus, new_revision: u64 },
    /// Another dispatcher (this process or a peer replica) already holds
    /// the lease, or committed first; this attempt is a quiet no-op
    /// (§8 invariant 2, "ticket race has exactly one winner").
    Superseded,
}

fn ticket_duration(ctx: &ManagerContext, kind: TicketKind) -> std::time::Duration {
    match kind {
        TicketKind::Cache => ctx.config.cache_ticket_duration,
        TicketKind::Executor => ctx.config.executor_ticket_duration,
    }
}

/// Re-derives the runtime result for a job sitting at `RESULTS_RECEIVED`
/// without an in-process carry-over from a preceding `fetchJobResult`
/// call. Treats the executor's `fetchResult` as idempotent by `jobKey`
/// (nothing in its contract says otherwise, and the alternative is
/// storing raw executor output on `JobState`, which nothing else reads).
/// Needed whenever `saveResultMetadata` is dispatched cold: a fresh poll
/// cycle, a different manager replica picking up the ticket, or the
/// process recovering after a crash between the two steps.
async fn refetch_runtime_result(
    ctx: &ManagerContext,
    state: &JobState,
) -> Result<RuntimeJobResult, ProcessorError> {
    let job_key = state.job_key.clone().ok_or_else(|| {
        ProcessorError::Internal("saveResultMetadata on the receive path requires a job key".into())
    })?;
    let batch_state = state.batch_state.clone().ok_or_else(|| {
        ProcessorError::Internal("saveResultMetadata on the receive path requires a batch state".into())
    })?;
    let raw = ctx.executor.fetch_result(&job_key, &batch_state).await?;
    Ok(RuntimeJobResult {
        outputs: raw.outputs,
        diagnostics: raw.diagnostics,
    })
}

/// Runs `operation` against `key`, which was last observed at `revision`.
/// Opens the ticket the operation needs, reads the guarded entry, runs
/// the step, and commits through [`commit_or_retry`]. Every exit path
/// closes the ticket exactly once (§4.1, §5 "no locks across I/O").
#[instrument(skip(ctx), fields(job_key = key.as_str()))]
pub async fn dispatch(
    ctx: &ManagerContext,
    key: JobKey,
    revision: u64,
    operation: Operation,
) -> Result<DispatchOutcome, JobManagerError> {
    let ticket = ctx
        .cache
        .open_ticket(&key, revision, ticket_duration(ctx, operation.ticket_kind()))
        .await?;
    if ticket.superseded() || ticket.missing() {
        ctx.cache.close(ticket).await.ok();
        ctx.metrics.operations_superseded.fetch_add(1, Ordering::Relaxed);
        return Ok(DispatchOutcome::Superseded);
    }

    let (state, _revision, _status) = ctx.cache.get_entry(&ticket).await?;
    let now = Utc::now();
    ctx.metrics.operations_dispatched.fetch_add(1, Ordering::Relaxed);

    let step_result = run_step(ctx, operation, state.clone(), now).await;
    commit_or_retry(ctx, ticket, state, step_result, now).await
}

/// Keeps dispatching the table's next operation for `key` as long as each
/// commit lands on a status that (a) still has a next operation and (b)
/// isn't in the running set, i.e. isn't gated by admission control. This
/// is the §4.6 step 4 "dispatch immediately" optimization: once a job's
/// executor round-trip is done, the whole `fetchJobResult ->
/// saveResultMetadata -> cleanUpJob -> scheduleRemoval` tail runs in one
/// go instead of waiting out up to four cache-poll intervals.
async fn chase_from(
    ctx: &ManagerContext,
    key: JobKey,
    outcome: DispatchOutcome,
) -> Result<DispatchOutcome, JobManagerError> {
    let DispatchOutcome::Applied { mut new_status, mut new_revision } = outcome else {
        return Ok(outcome);
    };
    loop {
        if new_status.is_running_set() {
            return Ok(DispatchOutcome::Applied { new_status, new_revision });
        }
        let Some(next_op) = crate::dispatch::next_operation(new_status) else {
            return Ok(DispatchOutcome::Applied { new_status, new_revision });
        };
        match dispatch(ctx, key.clone(), new_revision, next_op).await? {
            DispatchOutcome::Applied { new_status: s, new_revision: r } => {
                new_status = s;
                new_revision = r;
            }
            superseded @ DispatchOutcome::Superseded => return Ok(superseded),
        }
    }
}

/// [`dispatch`] followed immediately by [`chase_from`].
pub async fn dispatch_and_chase(
    ctx: &ManagerContext,
    key: JobKey,
    revision: u64,
    operation: Operation,
) -> Result<DispatchOutcome, JobManagerError> {
    let outcome = dispatch(ctx, key.clone(), revision, operation).await?;
    chase_from(ctx, key, outcome).await
}

/// Folds one `pollMany` observation into the cache, then chases the rest
/// of the tail if the observation already concluded the job (§4.5
/// `recordJobStatus`, §4.6 "Executor poll").
pub async fn dispatch_record_job_status(
    ctx: &ManagerContext,
    key: JobKey,
    revision: u64,
    info: &executor_client::ExecutorJobInfo,
) -> Result<DispatchOutcome, JobManagerError> {
    let ticket = ctx
        .cache
        .open_ticket(&key, revision, ctx.config.cache_ticket_duration)
        .await?;
    if ticket.superseded() || ticket.missing() {
        ctx.cache.close(ticket).await.ok();
        ctx.metrics.operations_superseded.fetch_add(1, Ordering::Relaxed);
        return Ok(DispatchOutcome::Superseded);
    }
    let (state, _revision, _status) = ctx.cache.get_entry(&ticket).await?;
    let now = Utc::now();
    let new_state = job_processor::record_job_status(state.clone(), info, now);
    let outcome = commit_or_retry(ctx, ticket, state, Ok(new_state), now).await?;
    chase_from(ctx, key, outcome).await
}

async fn run_step(
    ctx: &ManagerContext,
    operation: Operation,
    state: JobState,
    now: chrono::DateTime<Utc>,
) -> Result<JobState, ProcessorError> {
    match operation {
        Operation::ScheduleLaunch => {
            ctx.metrics.jobs_admitted.fetch_add(1, Ordering::Relaxed);
            Ok(job_processor::schedule_launch(state, now))
        }
        Operation::LaunchJob => {
            let result = job_processor::launch_job(
                state,
                &ctx.registry,
                ctx.metadata.as_ref(),
                ctx.executor.as_ref(),
                now,
            )
            .await;
            if result.is_ok() {
                ctx.metrics.jobs_launched.fetch_add(1, Ordering::Relaxed);
            }
            result
        }
        Operation::FetchJobResult => {
            let (new_state, _runtime_result) =
                job_processor::fetch_job_result(state, &ctx.registry, ctx.executor.as_ref(), now)
                    .await?;
            // The runtime result itself is intentionally not returned
            // here: it has no home on `JobState`, so a `SaveResultMetadata`
            // dispatch re-derives it if it runs cold. The "dispatch
            // immediately" optimization (§4.6 step 4) still applies — the
            // poller that commits this operation can turn straight around
            // and dispatch `SaveResultMetadata` for the same key without
            // waiting for the next tick.
            Ok(new_state)
        }
        Operation::SaveResultMetadata => {
            let runtime_result = if state.cache_status == CacheStatus::ResultsReceived {
                Some(refetch_runtime_result(ctx, &state).await?)
            } else {
                None
            };
            job_processor::save_result_metadata(
                state,
                &ctx.registry,
                ctx.metadata.as_ref(),
                runtime_result,
                now,
            )
            .await
        }
        Operation::CleanUpJob => Ok(job_processor::clean_up_job(state, ctx.executor.as_ref(), now).await),
        Operation::ScheduleRemoval => {
            let delay = chrono::Duration::from_std(ctx.config.scheduled_removal_delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(120));
            Ok(job_processor::schedule_removal(state, delay, now))
        }
        Operation::HandleProcessingFailed => {
            // The `ProcessorError` that tipped the job into
            // `PROCESSING_FAILED` was already stringified into
            // `state.error` by the retry wrapper that dispatched it
            // there; this step only needs to persist that record, not
            // the original error value.
            let message = state
                .status_message
                .clone()
                .unwrap_or_else(|| "job processing failed".to_string());
            job_processor::handle_processing_failed(state, ctx.metadata.as_ref(), message, None, now)
                .await
        }
    }
}

/// Commits a step's outcome, or folds a retryable failure back onto the
/// job (bumping `retries`) and a fatal or exhausted one into
/// `PROCESSING_FAILED` (§4.6, §8 invariant 4: "`retries >=
/// processingRetryLimit` leads to `PROCESSING_FAILED` in the next
/// commit"). Either way the ticket is closed exactly once, by
/// `update_entry` clearing the lease on success or by the explicit
/// `close` call on a benign race.
async fn commit_or_retry(
    ctx: &ManagerContext,
    ticket: Ticket,
    original_state: JobState,
    result: Result<JobState, ProcessorError>,
    now: chrono::DateTime<Utc>,
) -> Result<DispatchOutcome, JobManagerError> {
    let to_commit = match result {
        Ok(mut new_state) => {
            // A successful commit clears any retry count the job carried
            // from prior attempts at this same step (§8 S3: "retries
            // becomes 2, then resets on successful commit").
            new_state.retries = 0;
            new_state
        }
        Err(err) => {
            let mut next = original_state;
            next.retries += 1;
            next.error = Some(err.to_string());

            if err.classify() == Retryable::Retryable
                && next.retries < ctx.config.processing_retry_limit
            {
                next.status_message = Some(format!(
                    "retry {} of {}: {err}",
                    next.retries, ctx.config.processing_retry_limit
                ));
                next.updated_at = now;
                ctx.metrics.operations_retried.fetch_add(1, Ordering::Relaxed);
            } else {
                next.status_message = Some(err.to_string());
                next.transition(CacheStatus::ProcessingFailed, TracStatus::Failed, now);
                ctx.metrics.jobs_failed.fetch_add(1, Ordering::Relaxed);
            }
            next
        }
    };

    let new_status = to_commit.cache_status;
    if new_status == CacheStatus::ResultsSaved && to_commit.trac_status == TracStatus::Succeeded {
        ctx.metrics.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    let outcome = ctx.cache.update_entry(&ticket, new_status, to_commit).await;
    ctx.cache.close(ticket).await.ok();

    match outcome {
        Ok(new_revision) => Ok(DispatchOutcome::Applied { new_status, new_revision }),
        Err(e) if e.is_benign_race() => {
            ctx.metrics.operations_superseded.fetch_add(1, Ordering::Relaxed);
            Ok(DispatchOutcome::Superseded)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes a `SCHEDULED_TO_REMOVE` entry whose `removal_deadline` has
/// passed (§4.5 `removeFromCache`, §4.6 "Scheduled removal"). Unlike
/// every other operation this drops the row rather than committing a
/// new revision, so it has no `Operation` variant in the dispatch table:
/// it is driven by a delay timer the poller arms when it observes
/// `SCHEDULED_TO_REMOVE`, not by `next_operation`.
#[instrument(skip(ctx), fields(job_key = key.as_str()))]
pub async fn remove_from_cache(
    ctx: &ManagerContext,
    key: JobKey,
    revision: u64,
) -> Result<DispatchOutcome, JobManagerError> {
    let ticket = ctx
        .cache
        .open_ticket(&key, revision, ctx.config.cache_ticket_duration)
        .await?;
    if ticket.superseded() || ticket.missing() {
        ctx.cache.close(ticket).await.ok();
        return Ok(DispatchOutcome::Superseded);
    }

    let result = ctx.cache.remove_entry(&ticket).await;
    match result {
        Ok(()) => {
            ctx.metrics.jobs_removed.fetch_add(1, Ordering::Relaxed);
            Ok(DispatchOutcome::Applied {
                new_status: CacheStatus::ScheduledToRemove,
                new_revision: revision,
            })
        }
        Err(e) if e.is_benign_race() => Ok(DispatchOutcome::Superseded),
        Err(e) => {
            ctx.cache.close(ticket).await.ok();
            Err(e.into())
        }
    }
}
