//! Version history and push/pull message types for docsync.
//!
//! Defines the bounded per-entity history ([`MetaInfo`]), the version
//! identifiers stamped on every mutation, and the request/response
//! shapes the sync transport carries. Wire encoding is left to the
//! transport.

pub mod messages;
pub mod version;

pub use messages::{
    FetchResponse, PullRequest, PullResponse, PushOutcome, PushRequest, PushResponse,
};
pub use version::{DiffResult, MetaInfo, VersionEntry, VersionId, MAX_VERSION_ENTRIES};
