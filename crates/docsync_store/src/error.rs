//! Error types for the versioned store.

use docsync_protocol::VersionId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in versioned-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A malformed update operation.
    #[error("validation error: {0}")]
    Patch(#[from] docsync_patch::PatchError),

    /// Storage backend error (including entity-not-found).
    #[error("storage error: {0}")]
    Storage(docsync_storage::StorageError),

    /// A push based on a version that left the retained history window.
    ///
    /// Always recoverable: the caller resends the full entity instead of
    /// a diff.
    #[error("version {version} of entity {id} is no longer in retained history")]
    StaleVersion {
        /// The entity id.
        id: String,
        /// The client's unrecoverable base version.
        version: VersionId,
    },

    /// A stored entity is missing or carries unreadable version history.
    #[error("corrupt version history for entity {id}")]
    CorruptMeta {
        /// The entity id.
        id: String,
    },

    /// An operation addressed the reserved bookkeeping field.
    #[error("operation touches reserved field `{path}`")]
    ReservedField {
        /// The offending path.
        path: String,
    },
}

impl From<docsync_storage::StorageError> for StoreError {
    fn from(err: docsync_storage::StorageError) -> Self {
        // A patch failure inside the backend's apply path is a
        // validation error, not a storage fault.
        match err {
            docsync_storage::StorageError::Patch(patch) => Self::Patch(patch),
            other => Self::Storage(other),
        }
    }
}

impl StoreError {
    /// Creates a corrupt-meta error.
    pub fn corrupt_meta(id: impl Into<String>) -> Self {
        Self::CorruptMeta { id: id.into() }
    }

    /// Returns true if the caller can recover by resending the full
    /// entity.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::StaleVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_patch_errors_surface_as_validation() {
        let patch_err = docsync_patch::PatchError::MixedOperation;
        let storage_err = docsync_storage::StorageError::from(patch_err);
        let err = StoreError::from(storage_err);
        assert!(matches!(err, StoreError::Patch(_)));

        let err = StoreError::from(docsync_storage::StorageError::not_found("e1"));
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[test]
    fn stale_version_is_recoverable() {
        let err = StoreError::StaleVersion {
            id: "e1".into(),
            version: VersionId::new(),
        };
        assert!(err.is_recoverable());
        assert!(!StoreError::corrupt_meta("e1").is_recoverable());
    }
}
