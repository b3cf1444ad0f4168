use job_protocol::CacheStatus;

/// Which ticket duration an operation should request (§4.6 table,
/// "short for cache-only steps, long for executor round-trips", §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    Cache,
    Executor,
}

/// One cache-initiated operation the dispatcher can run against a job
/// snapshot (§4.6 dispatch table). `RemoveFromCache` is deliberately
/// absent: it never comes from `next_operation` (it fires off the
/// scheduled-removal delay timer, not a polled status), so it is its own
/// function in `crate::execute` rather than a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ScheduleLaunch,
    LaunchJob,
    FetchJobResult,
    SaveResultMetadata,
    CleanUpJob,
    ScheduleRemoval,
    HandleProcessingFailed,
}

impl Operation {
    pub fn ticket_kind(&self) -> TicketKind {
        match self {
            Operation::ScheduleLaunch => TicketKind::Cache,
            Operation::LaunchJob => TicketKind::Executor,
            Operation::FetchJobResult => TicketKind::Executor,
            Operation::SaveResultMetadata => TicketKind::Cache,
            Operation::CleanUpJob => TicketKind::Cache,
            Operation::ScheduleRemoval => TicketKind::Cache,
            Operation::HandleProcessingFailed => TicketKind::Cache,
        }
    }
}

/// §4.6 cache-status → next-operation table.
///
/// `CacheStatus` is a closed Rust enum, so the §4.6 "anything else"
/// branch has no syntactic home here: every variant is matched
/// explicitly, and the match is exhaustive by construction. The
/// equivalent safety net for a state the table doesn't expect is the
/// ticket/revision check at the dispatcher's call site (`crate::execute`):
/// by the time an operation would run against a status the enumerating
/// poll observed, a mismatched revision already routes the attempt to
/// `DispatchOutcome::Superseded` rather than letting it run against
/// stale data, which is the same protection the spec's internal-error
/// branch provides for "unexpected state observed mid-dispatch".
pub fn next_operation(status: CacheStatus) -> Option<Operation> {
    match status {
        CacheStatus::QueuedInTrac => Some(Operation::ScheduleLaunch),
        CacheStatus::LaunchScheduled => Some(Operation::LaunchJob),
        CacheStatus::SentToExecutor
        | CacheStatus::QueuedInExecutor
        | CacheStatus::RunningInExecutor => None,
        CacheStatus::ExecutorComplete | CacheStatus::ExecutorSucceeded => {
            Some(Operation::FetchJobResult)
        }
        CacheStatus::ExecutorFailed | CacheStatus::ResultsReceived | CacheStatus::ResultsInvalid => {
            Some(Operation::SaveResultMetadata)
        }
        CacheStatus::ResultsSaved => Some(Operation::CleanUpJob),
        CacheStatus::ReadyToRemove => Some(Operation::ScheduleRemoval),
        CacheStatus::ScheduledToRemove => None,
        CacheStatus::ProcessingFailed => Some(Operation::HandleProcessingFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_is_accounted_for() {
        for status in CacheStatus::ALL {
            let op = next_operation(*status);
            let is_running_or_removal_timer = matches!(
                status,
                CacheStatus::SentToExecutor
                    | CacheStatus::QueuedInExecutor
                    | CacheStatus::RunningInExecutor
                    | CacheStatus::ScheduledToRemove
            );
            assert!(
                op.is_some() || is_running_or_removal_timer,
                "status {status:?} has no dispatch path"
            );
        }
    }

    #[test]
    fn launch_job_requests_an_executor_ticket() {
        assert_eq!(Operation::LaunchJob.ticket_kind(), TicketKind::Executor);
        assert_eq!(Operation::ScheduleLaunch.ticket_kind(), TicketKind::Cache);
    }

    #[test]
    fn both_executor_complete_variants_fetch_without_branching() {
        assert_eq!(
            next_operation(CacheStatus::ExecutorComplete),
            Some(Operation::FetchJobResult)
        );
        assert_eq!(
            next_operation(CacheStatus::ExecutorSucceeded),
            Some(Operation::FetchJobResult)
        );
    }
}
