use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use job_protocol::{CacheStatus, JobKey, JobState};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::CacheError;
use crate::ticket::Ticket;
use crate::traits::{JobCache, QueryStateRow};

#[derive(Debug, Clone)]
struct Lease {
    token: Uuid,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: JobState,
    revision: u64,
    status: CacheStatus,
    lease: Option<Lease>,
    sequence: u64,
}

/// Reference backend implementing the exact ticket semantics of §4.1 with
/// a `Mutex`-guarded in-memory map. Used as the default test double and
/// as a legitimate embedded backend for single-replica deployments.
#[derive(Default)]
pub struct InMemoryJobCache {
    entries: Mutex<HashMap<JobKey, Entry>>,
    new_ticket_leases: Mutex<HashMap<JobKey, Lease>>,
    next_sequence: std::sync::atomic::AtomicU64,
}

impl InMemoryJobCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobCache for InMemoryJobCache {
    async fn open_new_ticket(&self, key: &JobKey, timeout: Duration) -> Result<Ticket, CacheError> {
        let now = Instant::now();
        let entries = self.entries.lock().expect("job cache mutex poisoned");
        if entries.contains_key(key) {
            return Ok(Ticket::superseded_ticket(key.clone()));
        }
        drop(entries);

        let mut pending = self.new_ticket_leases.lock().expect("job cache mutex poisoned");
        if let Some(existing) = pending.get(key) {
            if existing.is_live(now) {
                return Ok(Ticket::superseded_ticket(key.clone()));
            }
        }
        let token = Uuid::new_v4();
        pending.insert(
            key.clone(),
            Lease {
                token,
                expires_at: now + timeout,
            },
        );
        Ok(Ticket::new(key.clone(), token, None))
    }

    async fn open_ticket(
        &self,
        key: &JobKey,
        revision: u64,
        timeout: Duration,
    ) -> Result<Ticket, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("job cache mutex poisoned");
        let Some(entry) = entries.get_mut(key) else {
            return Ok(Ticket::missing_ticket(key.clone()));
        };
        if entry.revision != revision {
            return Ok(Ticket::superseded_ticket(key.clone()));
        }
        if let Some(existing) = &entry.lease {
            if existing.is_live(now) {
                // Another replica already holds the lease at this revision;
                // invariant 2 (§8) requires exactly one winner.
                return Ok(Ticket::superseded_ticket(key.clone()));
            }
        }
        let token = Uuid::new_v4();
        entry.lease = Some(Lease {
            token,
            expires_at: now + timeout,
        });
        Ok(Ticket::new(key.clone(), token, Some(revision)))
    }

    async fn add_entry(
        &self,
        ticket: &Ticket,
        status: CacheStatus,
        value: JobState,
    ) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut pending = self.new_ticket_leases.lock().expect("job cache mutex poisoned");
        match pending.get(&ticket.key) {
            Some(lease) if lease.token == ticket.token => {
                if !lease.is_live(now) {
                    pending.remove(&ticket.key);
                    return Err(CacheError::LeaseExpired);
                }
            }
            _ => return Err(CacheError::Superseded),
        }
        pending.remove(&ticket.key);
        drop(pending);

        let mut entries = self.entries.lock().expect("job cache mutex poisoned");
        if entries.contains_key(&ticket.key) {
            return Err(CacheError::AlreadyExists(ticket.key.to_string()));
        }
        let sequence = self
            .next_sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        entries.insert(
            ticket.key.clone(),
            Entry {
                value,
                revision: 1,
                status,
                lease: None,
                sequence,
            },
        );
        Ok(1)
    }

    async fn get_entry(&self, ticket: &Ticket) -> Result<(JobState, u64, CacheStatus), CacheError> {
        let entries = self.entries.lock().expect("job cache mutex poisoned");
        let entry = entries
            .get(&ticket.key)
            .ok_or_else(|| CacheError::Missing(ticket.key.to_string()))?;
        Ok((entry.value.clone(), entry.revision, entry.status))
    }

    async fn get_latest_entry(
        &self,
        key: &JobKey,
    ) -> Result<Option<(JobState, u64, CacheStatus)>, CacheError> {
        let entries = self.entries.lock().expect("job cache mutex poisoned");
        Ok(entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.revision, entry.status)))
    }

    async fn update_entry(
        &self,
        ticket: &Ticket,
        new_status: CacheStatus,
        new_value: JobState,
    ) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("job cache mutex poisoned");
        let Some(entry) = entries.get_mut(&ticket.key) else {
            return Err(CacheError::Superseded);
        };
        let Some(base_revision) = ticket.base_revision else {
            return Err(CacheError::Superseded);
        };
        let Some(lease) = &entry.lease else {
            return Err(CacheError::Superseded);
        };
        if lease.token != ticket.token {
            return Err(CacheError::Superseded);
        }
        if !lease.is_live(now) {
            entry.lease = None;
            return Err(CacheError::LeaseExpired);
        }
        if entry.revision != base_revision {
            return Err(CacheError::Superseded);
        }

        entry.value = new_value;
        entry.status = new_status;
        entry.revision += 1;
        entry.lease = None;
        Ok(entry.revision)
    }

    async fn remove_entry(&self, ticket: &Ticket) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("job cache mutex poisoned");
        let Some(entry) = entries.get(&ticket.key) else {
            return Err(CacheError::Superseded);
        };
        let Some(base_revision) = ticket.base_revision else {
            return Err(CacheError::Superseded);
        };
        match &entry.lease {
            Some(lease) if lease.token == ticket.token && lease.is_live(now) => {}
            Some(_) => return Err(CacheError::Superseded),
            None => return Err(CacheError::Superseded),
        }
        if entry.revision != base_revision {
            return Err(CacheError::Superseded);
        }
        entries.remove(&ticket.key);
        Ok(())
    }

    async fn query_state(
        &self,
        statuses: &[CacheStatus],
        include_ticketed: bool,
    ) -> Result<Vec<QueryStateRow>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.lock().expect("job cache mutex poisoned");
        let rows = entries
            .iter()
            .filter(|(_, entry)| {
                statuses.contains(&entry.status)
                    || (include_ticketed
                        && entry
                            .lease
                            .as_ref()
                            .map(|lease| lease.is_live(now))
                            .unwrap_or(false))
            })
            .map(|(key, entry)| QueryStateRow {
                key: key.clone(),
                revision: entry.revision,
                status: entry.status,
                sequence: entry.sequence,
            })
            .collect();
        Ok(rows)
    }

    async fn close(&self, ticket: Ticket) -> Result<(), CacheError> {
        let mut pending = self.new_ticket_leases.lock().expect("job cache mutex poisoned");
        if let Some(lease) = pending.get(&ticket.key) {
            if lease.token == ticket.token {
                pending.remove(&ticket.key);
                return Ok(());
            }
        }
        drop(pending);

        let mut entries = self.entries.lock().expect("job cache mutex poisoned");
        if let Some(entry) = entries.get_mut(&ticket.key) {
            if let Some(lease) = &entry.lease {
                if lease.token == ticket.token {
                    entry.lease = None;
                }
            }
        }
        Ok(())
    }
}
