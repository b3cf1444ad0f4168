use std::time::Duration;

use async_trait::async_trait;
use job_protocol::{CacheStatus, JobKey, JobState};

use crate::error::CacheError;
use crate::ticket::Ticket;

/// One row of a `queryState` result: a key's last-committed revision and
/// status, without pulling the full `JobState` value.
#[derive(Debug, Clone)]
pub struct QueryStateRow {
    pub key: JobKey,
    pub revision: u64,
    pub status: CacheStatus,
    /// Monotonic arrival order assigned when the key was first added, used
    /// by admission control for "FIFO by cache-enumeration order" (§4.6
    /// step 3) since a plain key iteration gives no ordering guarantee.
    pub sequence: u64,
}

/// The distributed job cache contract (§4.1). Implementations must
/// provide the ticket/lease semantics described there; see
/// [`InMemoryJobCache`](crate::InMemoryJobCache) for the reference
/// backend and the exact invariants it upholds.
#[async_trait]
pub trait JobCache: Send + Sync {
    /// Acquire a lease on a key that must not already exist.
    /// `ticket.superseded()` is true iff the key already exists.
    async fn open_new_ticket(&self, key: &JobKey, timeout: Duration) -> Result<Ticket, CacheError>;

    /// Acquire a lease at a specific revision. `ticket.superseded()` is
    /// true iff the current revision does not match; `ticket.missing()`
    /// is true iff the key is gone.
    async fn open_ticket(
        &self,
        key: &JobKey,
        revision: u64,
        timeout: Duration,
    ) -> Result<Ticket, CacheError>;

    /// Create a new entry. Fails with [`CacheError::AlreadyExists`] if the
    /// key exists, or [`CacheError::Superseded`]/[`CacheError::LeaseExpired`]
    /// if the ticket is no longer valid.
    async fn add_entry(
        &self,
        ticket: &Ticket,
        status: CacheStatus,
        value: JobState,
    ) -> Result<u64, CacheError>;

    /// Read the entry a ticket is held against.
    async fn get_entry(&self, ticket: &Ticket) -> Result<(JobState, u64, CacheStatus), CacheError>;

    /// Lock-free read for query endpoints (§6 `queryJob`); bypasses the
    /// ticket mechanism entirely.
    async fn get_latest_entry(
        &self,
        key: &JobKey,
    ) -> Result<Option<(JobState, u64, CacheStatus)>, CacheError>;

    /// Atomic compare-and-swap: the new value is committed only if the
    /// ticket's revision still matches the entry's current revision.
    /// Bumps the revision by 1 and returns the new value.
    async fn update_entry(
        &self,
        ticket: &Ticket,
        new_status: CacheStatus,
        new_value: JobState,
    ) -> Result<u64, CacheError>;

    /// Delete the entry the ticket is held against.
    async fn remove_entry(&self, ticket: &Ticket) -> Result<(), CacheError>;

    /// Return keys whose last-committed status is in `statuses`. When
    /// `include_ticketed` is true, also includes keys currently under a
    /// live ticket (used for admission counting against jobs another
    /// replica is mid-dispatch on, per §4.6 step 3).
    async fn query_state(
        &self,
        statuses: &[CacheStatus],
        include_ticketed: bool,
    ) -> Result<Vec<QueryStateRow>, CacheError>;

    /// Release the lease. Must be called on every exit path from the
    /// guarded region (§4.1, §5 "no locks across I/O").
    async fn close(&self, ticket: Ticket) -> Result<(), CacheError>;
}
