//! Push/pull request and response shapes.
//!
//! These are the structures a transport carries between a client's
//! local-state machine and a server's versioned store. The wire encoding
//! itself (HTTP or otherwise) is not part of the core.

use crate::version::{DiffResult, VersionId};
use docsync_patch::UpdateOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server: pending commits plus the client's last-known version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// The entity collection name.
    pub entity_name: String,
    /// The entity id.
    pub id: String,
    /// The client's last server-confirmed version.
    pub version: VersionId,
    /// The commits being pushed, in order.
    pub operations: Vec<UpdateOperation>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(
        entity_name: impl Into<String>,
        id: impl Into<String>,
        version: VersionId,
        operations: Vec<UpdateOperation>,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: id.into(),
            version,
            operations,
        }
    }
}

/// The two mutually exclusive ways a push resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The client was current: here is the fully updated entity.
    Entity {
        /// The updated entity, meta stripped.
        entity: Value,
        /// The version the push produced.
        version: VersionId,
    },
    /// The client was behind: here is everything recorded after its
    /// version (the client's own merged operation included), to rebase
    /// onto.
    Diffs {
        /// Operations in application order.
        operations: Vec<UpdateOperation>,
        /// The current version after the push.
        version: VersionId,
    },
}

/// Server → client push reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// How the push resolved.
    pub outcome: PushOutcome,
}

impl PushResponse {
    /// A reply carrying the fully updated entity.
    pub fn entity(entity: Value, version: VersionId) -> Self {
        Self {
            outcome: PushOutcome::Entity { entity, version },
        }
    }

    /// A reply carrying the master's diffs for a behind client.
    pub fn diffs(operations: Vec<UpdateOperation>, version: VersionId) -> Self {
        Self {
            outcome: PushOutcome::Diffs { operations, version },
        }
    }

    /// Returns true when the reply carries the updated entity.
    pub fn has_entity(&self) -> bool {
        matches!(self.outcome, PushOutcome::Entity { .. })
    }
}

/// Client → server: request for diffs since a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// The entity collection name.
    pub entity_name: String,
    /// The entity id.
    pub id: String,
    /// The client's last server-confirmed version.
    pub version: VersionId,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(entity_name: impl Into<String>, id: impl Into<String>, version: VersionId) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: id.into(),
            version,
        }
    }
}

/// Server → client pull reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// The history outcome for the requested version.
    pub result: DiffResult,
}

impl PullResponse {
    /// Creates a pull reply.
    pub fn new(result: DiffResult) -> Self {
        Self { result }
    }
}

/// Server → client fetch reply: the full entity for a client whose
/// version left the retained window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// The entity, meta stripped.
    pub entity: Value,
    /// Its current version.
    pub version: VersionId,
}

impl FetchResponse {
    /// Creates a fetch reply.
    pub fn new(entity: Value, version: VersionId) -> Self {
        Self { entity, version }
    }
}
