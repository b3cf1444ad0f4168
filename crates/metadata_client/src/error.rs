use thiserror::Error;

/// Metadata client failure modes (§4.3, §7).
#[derive(Debug, Error, Clone)]
pub enum MetadataError {
    /// Stale id, duplicate save, or similar; fatal to the job (§7
    /// `MetadataConflict`).
    #[error("metadata conflict: {0}")]
    Conflict(String),

    /// Transient; the metadata RPCs inside C5 are subject to the §4.6
    /// retry-or-fail wrapper like any other collaborator call.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}
