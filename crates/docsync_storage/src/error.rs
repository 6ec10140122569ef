//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No document exists under the given id.
    #[error("document not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// An insert collided with an existing id.
    #[error("duplicate document id: {id}")]
    DuplicateId {
        /// The colliding id.
        id: String,
    },

    /// The document to store was not an object.
    #[error("document must be a JSON object")]
    NotAnObject,

    /// Applying an update inside the backend failed.
    #[error("patch error: {0}")]
    Patch(#[from] docsync_patch::PatchError),

    /// A backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a duplicate-id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
