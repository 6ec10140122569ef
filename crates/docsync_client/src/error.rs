//! Error types for the client state machine.

use docsync_patch::PatchError;
use docsync_protocol::VersionId;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while driving the local-state machine.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The client is not following this entity.
    #[error("no entity found: {entity_name}/{id}")]
    NoEntity {
        /// The entity collection name.
        entity_name: String,
        /// The entity id.
        id: String,
    },

    /// A patch failed to normalize or apply.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Network or transport failure. Never corrupts local state; pending
    /// commits stay queued for a later retry.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// The server could not reconstruct diffs from the pushed version.
    /// Recoverable: refresh the full entity and push again.
    #[error("version {version} of {entity_name}/{id} is too far behind retained history")]
    Stale {
        /// The entity collection name.
        entity_name: String,
        /// The entity id.
        id: String,
        /// The version the server rejected.
        version: VersionId,
    },

    /// The server rejected the request for another reason.
    #[error("server error: {0}")]
    Server(String),
}

impl ClientError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a not-following error.
    pub fn no_entity(entity_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NoEntity {
            entity_name: entity_name.into(),
            id: id.into(),
        }
    }

    /// Returns true for transport failures that queue work for retry.
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network { .. })
    }

    /// Returns true if the caller can recover without losing edits.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::Network { .. } | ClientError::Stale { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_recoverable() {
        let err = ClientError::network("connection refused");
        assert!(err.is_network());
        assert!(err.is_recoverable());
    }

    #[test]
    fn missing_entity_is_not_recoverable() {
        let err = ClientError::no_entity("users", "u1");
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "no entity found: users/u1");
    }
}
