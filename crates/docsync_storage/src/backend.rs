//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::filter::Filter;
use docsync_patch::UpdateOperation;
use serde_json::Value;

/// A document store underneath the versioned entity layer.
///
/// Backends are **opaque document stores**: they hold whatever JSON
/// object they are given, reserved bookkeeping fields included, and
/// never interpret them. The versioned store above is the only layer
/// that knows about version history.
///
/// # Invariants
///
/// - Every stored document is a JSON object with a string `"id"` field;
///   `insert` assigns one when absent.
/// - `update` applies the given normalized operation atomically with
///   respect to other writers of the same id.
/// - Backends must be `Send + Sync` for concurrent access.
pub trait StorageBackend: Send + Sync {
    /// Returns every document matching the filter.
    fn find(&self, filter: &Filter) -> StorageResult<Vec<Value>>;

    /// Returns the document with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound)
    /// when no document has the id.
    fn get(&self, id: &str) -> StorageResult<Value>;

    /// Stores a new document, assigning an id when absent.
    ///
    /// Returns the stored document, id included.
    fn insert(&self, document: Value) -> StorageResult<Value>;

    /// Applies a normalized update operation to the document with the
    /// given id, returning the updated document.
    fn update(&self, id: &str, operation: &UpdateOperation) -> StorageResult<Value>;

    /// Deletes the document with the given id.
    fn delete(&self, id: &str) -> StorageResult<()>;

    /// Deletes every document matching the filter, returning the count.
    fn delete_where(&self, filter: &Filter) -> StorageResult<usize>;
}
