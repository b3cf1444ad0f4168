//! The metadata/object store client contract (§4.3, C3).
//!
//! The core only ever calls `loadObjects`, `preallocateIds`,
//! `saveInitialMetadata`, and `saveResultMetadata`; everything else
//! about the metadata store (object versioning, tag storage, search) is
//! explicitly out of scope (§1).

mod error;
mod in_memory;
mod traits;

pub use error::MetadataError;
pub use in_memory::InMemoryMetadataClient;
pub use traits::{MetadataClient, ObjectHeader, Selector};
