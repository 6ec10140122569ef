//! Immutable document-patch algebra.
//!
//! MongoDB-style update operators applied to arbitrary JSON documents
//! with deterministic semantics: [`normalize`] turns a raw update
//! document into a canonical [`UpdateOperation`], [`apply`] produces a
//! new document without touching the input, and the `merge` functions
//! combine queued operations for replay or compaction.
//!
//! Everything here is pure; nothing suspends or does I/O.

pub mod apply;
pub mod error;
pub mod merge;
pub mod operation;
pub mod path;
pub mod value;

pub use apply::{apply, apply_all, TYPE_TAG};
pub use error::{PatchError, PatchResult};
pub use merge::{merge_for_replay, merge_for_storage};
pub use operation::{is_operator_object, normalize, Operator, UpdateOperation, UpdateStep};
pub use path::{DocPath, Segment};
pub use value::{compare_values, deep_equals, get_path};
