use job_protocol::JobKey;
use uuid::Uuid;

/// A lease granting the holder the exclusive right to commit the next
/// revision of a cache entry (glossary: "Ticket").
///
/// Tickets are opaque to callers beyond [`Ticket::superseded`] and
/// [`Ticket::missing`]; the lease token inside is only meaningful to the
/// backend that issued it.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub(crate) key: JobKey,
    pub(crate) token: Uuid,
    pub(crate) base_revision: Option<u64>,
    superseded: bool,
    missing: bool,
}

impl Ticket {
    pub(crate) fn new(key: JobKey, token: Uuid, base_revision: Option<u64>) -> Self {
        Self {
            key,
            token,
            base_revision,
            superseded: false,
            missing: false,
        }
    }

    pub(crate) fn superseded_ticket(key: JobKey) -> Self {
        Self {
            key,
            token: Uuid::nil(),
            base_revision: None,
            superseded: true,
            missing: false,
        }
    }

    pub(crate) fn missing_ticket(key: JobKey) -> Self {
        Self {
            key,
            token: Uuid::nil(),
            base_revision: None,
            superseded: false,
            missing: true,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// True iff `openNewTicket` found the key already present, or
    /// `openTicket` found the current revision did not match the one
    /// requested (§4.1).
    pub fn superseded(&self) -> bool {
        self.superseded
    }

    /// True iff `openTicket` was called against a key that no longer
    /// exists (§4.1).
    pub fn missing(&self) -> bool {
        self.missing
    }
}
