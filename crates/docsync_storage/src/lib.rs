//! Storage backend contract for docsync.
//!
//! Backends are **opaque document stores**: they hold whatever JSON
//! object they are given (reserved bookkeeping fields included) and
//! never interpret it. The versioned store above is the only layer that
//! knows about version history.
//!
//! Query matching is a flat predicate filter by design, not a planner.

mod backend;
mod error;
mod filter;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use filter::Filter;
pub use memory::MemoryBackend;
