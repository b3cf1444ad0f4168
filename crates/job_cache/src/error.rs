use thiserror::Error;

/// Cache failure modes (§4.1 "Failure modes").
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// Transient connectivity error; the caller should retry (§4.1, §7
    /// `CacheUnavailable`).
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// `addEntry` was attempted against a key that already exists.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// The ticket's revision no longer matches the cache's current
    /// revision, or the key was deleted out from under it.
    #[error("ticket superseded")]
    Superseded,

    /// The requested key does not exist.
    #[error("key missing: {0}")]
    Missing(String),

    /// A commit was attempted through a ticket whose lease has expired
    /// (§4.1 invariant: "after the lease expires, any attempted commit
    /// with the expired ticket must fail"). The manager treats this the
    /// same as [`CacheError::Superseded`] — a benign lost race.
    #[error("ticket lease expired")]
    LeaseExpired,
}

impl CacheError {
    /// Whether the manager should fold this outcome into the benign
    /// "another replica won" path rather than treating it as a failure.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, CacheError::Superseded | CacheError::LeaseExpired)
    }

    /// Whether this is an expected transient failure (§4.1, §4.7
    /// "Cache unreachable"): the pollers must log and continue on these
    /// without feeding the unexpected-error counters that trip
    /// `cachePollErrorLimit`/`executorPollErrorLimit`.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Unavailable(_))
    }
}
