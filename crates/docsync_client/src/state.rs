//! Per-entity optimistic local state.

use crate::error::ClientResult;
use docsync_patch::{apply, apply_all, UpdateOperation};
use docsync_protocol::VersionId;
use serde_json::Value;

/// Addresses one followed entity: collection name plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    /// The entity collection name.
    pub entity_name: String,
    /// The entity id.
    pub id: String,
}

impl EntityKey {
    /// Creates a key.
    pub fn new(entity_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: id.into(),
        }
    }
}

/// Bookkeeping for commits that failed to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreachedCommit {
    /// The entity collection name.
    pub entity_name: String,
    /// The entity id.
    pub id: String,
    /// How many leading commits have not reached the server.
    pub commit_count: usize,
}

/// The client-resident state of one followed entity.
///
/// `origin` is the last server-confirmed document and `commits` are the
/// locally-applied, not-yet-confirmed operations. `head` is kept exactly
/// equal to `commits` folded over `origin`, and is `None` whenever
/// `commits` is empty (origin is the current view, no copy needed).
#[derive(Debug, Clone)]
pub struct LocalEntityState {
    origin: Value,
    version: VersionId,
    commits: Vec<UpdateOperation>,
    head: Option<Value>,
}

impl LocalEntityState {
    /// Starts following a server-confirmed entity.
    pub fn new(origin: Value, version: VersionId) -> Self {
        Self {
            origin,
            version,
            commits: Vec::new(),
            head: None,
        }
    }

    /// The last server-confirmed document.
    pub fn origin(&self) -> &Value {
        &self.origin
    }

    /// The version matching `origin`.
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// The unconfirmed commits, oldest first.
    pub fn commits(&self) -> &[UpdateOperation] {
        &self.commits
    }

    /// The current local view: head when commits are pending, origin
    /// otherwise.
    pub fn current(&self) -> &Value {
        self.head.as_ref().unwrap_or(&self.origin)
    }

    /// Returns true when unconfirmed commits are queued.
    pub fn has_pending(&self) -> bool {
        !self.commits.is_empty()
    }

    /// Applies an operation locally and queues it for pushing.
    pub fn commit(&mut self, operation: UpdateOperation) -> ClientResult<&Value> {
        let next = apply(self.current(), &operation)?;
        self.commits.push(operation);
        self.head = Some(next);
        Ok(self.current())
    }

    /// Confirms `consumed` leading commits with the fully updated entity
    /// the server returned.
    pub fn confirm(
        &mut self,
        entity: Value,
        version: VersionId,
        consumed: usize,
    ) -> ClientResult<()> {
        self.origin = entity;
        self.version = version;
        self.commits.drain(..consumed.min(self.commits.len()));
        self.recompute_head()
    }

    /// Rebases onto a behind-push reply: the server's diffs (which
    /// include the pushed commits, already merged) advance `origin`, the
    /// pushed prefix is consumed, and the remaining commits replay on
    /// top.
    pub fn rebase_push(
        &mut self,
        diffs: &[UpdateOperation],
        version: VersionId,
        consumed: usize,
    ) -> ClientResult<()> {
        self.origin = apply_all(&self.origin, diffs)?;
        self.version = version;
        self.commits.drain(..consumed.min(self.commits.len()));
        self.recompute_head()
    }

    /// Rebases onto pulled diffs: `origin` advances by the server's
    /// operations and every queued commit replays on top. Nothing is
    /// consumed, since a pull confirms no local commits.
    pub fn rebase_pull(&mut self, diffs: &[UpdateOperation], version: VersionId) -> ClientResult<()> {
        self.origin = apply_all(&self.origin, diffs)?;
        self.version = version;
        self.recompute_head()
    }

    /// Resets `origin` from a full fetch, keeping queued commits.
    pub fn reset_origin(&mut self, entity: Value, version: VersionId) -> ClientResult<()> {
        self.origin = entity;
        self.version = version;
        self.recompute_head()
    }

    fn recompute_head(&mut self) -> ClientResult<()> {
        self.head = if self.commits.is_empty() {
            None
        } else {
            Some(apply_all(&self.origin, &self.commits)?)
        };
        Ok(())
    }
}
