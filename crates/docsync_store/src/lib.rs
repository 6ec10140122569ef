//! Server-side versioned entity store.
//!
//! Wraps a [`docsync_storage`] backend and attaches a bounded version
//! history to every entity under a reserved document field. The store
//! records each update as a history entry, answers diff queries from any
//! retained version, and reconciles client pushes into a single
//! authoritative operation stream.

mod error;
mod meta;
mod store;

pub use error::{StoreError, StoreResult};
pub use meta::{strip_meta, META_FIELD};
pub use store::{PushValidator, RefuseStale, VersionedStore};
