//! Per-entity version history.

use docsync_patch::{PatchResult, UpdateOperation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of history entries retained per entity.
///
/// The cap is enforced on every append, not periodically; a version older
/// than the retained window is unrecoverable and forces a full fetch.
pub const MAX_VERSION_ENTRIES: usize = 100;

/// Opaque identifier stamped on an entity each time it is mutated.
///
/// Ordering is positional within one entity's history, not derivable from
/// the identifier itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Generates a fresh version identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single historical patch plus the version it produced.
///
/// `op` is the JSON-serialized operation, or the empty string for the
/// entry created at insertion (there is no prior patch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// The version this entry produced.
    pub id: VersionId,
    /// The serialized operation, empty for the insert entry.
    pub op: String,
}

impl VersionEntry {
    /// The entry recorded at insertion.
    pub fn initial(id: VersionId) -> Self {
        Self { id, op: String::new() }
    }

    /// Parses the recorded operation, `None` for the insert entry.
    pub fn operation(&self) -> PatchResult<Option<UpdateOperation>> {
        if self.op.is_empty() {
            return Ok(None);
        }
        UpdateOperation::parse_json(&self.op).map(Some)
    }
}

/// The bounded, ordered version history attached to a stored entity.
///
/// Never empty once the entity exists; the last entry's id is the
/// current version, the second-to-last the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// History entries, oldest first, capped at [`MAX_VERSION_ENTRIES`].
    versions: Vec<VersionEntry>,
}

/// The outcome of asking for history after a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffResult {
    /// The version is current; nothing to send.
    UpToDate {
        /// The entity's current version.
        version: VersionId,
    },
    /// The operations recorded strictly after the given version.
    Diffs {
        /// Operations in application order.
        operations: Vec<UpdateOperation>,
        /// The entity's current version.
        version: VersionId,
    },
    /// The version left the retained window (or was never part of this
    /// history); the caller must fall back to a full fetch.
    NotFound,
}

impl DiffResult {
    /// Returns true for the `UpToDate` outcome.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate { .. })
    }
}

impl MetaInfo {
    /// Creates the history recorded at insertion: one entry, empty op.
    pub fn initial() -> Self {
        Self {
            versions: vec![VersionEntry::initial(VersionId::new())],
        }
    }

    /// Rebuilds a history from raw entries.
    ///
    /// Returns `None` for an empty entry list, which no live entity may
    /// have.
    pub fn from_entries(versions: Vec<VersionEntry>) -> Option<Self> {
        if versions.is_empty() {
            None
        } else {
            Some(Self { versions })
        }
    }

    /// The entity's current version.
    pub fn current(&self) -> VersionId {
        self.versions
            .last()
            .expect("history is never empty")
            .id
    }

    /// The version before the current one, if any survives in the window.
    pub fn previous(&self) -> Option<VersionId> {
        let len = self.versions.len();
        (len >= 2).then(|| self.versions[len - 2].id)
    }

    /// Records an applied operation, returning the new current version.
    ///
    /// The oldest entry is evicted once the history exceeds
    /// [`MAX_VERSION_ENTRIES`].
    pub fn record(&mut self, operation: &UpdateOperation) -> PatchResult<VersionId> {
        let id = VersionId::new();
        self.versions.push(VersionEntry {
            id,
            op: operation.to_json_string()?,
        });
        if self.versions.len() > MAX_VERSION_ENTRIES {
            let excess = self.versions.len() - MAX_VERSION_ENTRIES;
            self.versions.drain(..excess);
        }
        Ok(id)
    }

    /// Returns the operations recorded strictly after `version`.
    pub fn diff_since(&self, version: &VersionId) -> PatchResult<DiffResult> {
        let current = self.current();
        if *version == current {
            return Ok(DiffResult::UpToDate { version: current });
        }
        let Some(position) = self.versions.iter().position(|entry| entry.id == *version) else {
            return Ok(DiffResult::NotFound);
        };
        let mut operations = Vec::with_capacity(self.versions.len() - position - 1);
        for entry in &self.versions[position + 1..] {
            match entry.operation()? {
                Some(op) => operations.push(op),
                // An empty op only exists at insertion, which is always
                // the first entry; anything after a known version has one.
                None => return Ok(DiffResult::NotFound),
            }
        }
        Ok(DiffResult::Diffs {
            operations,
            version: current,
        })
    }

    /// The history entries, oldest first.
    pub fn entries(&self) -> &[VersionEntry] {
        &self.versions
    }

    /// The number of retained entries.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Always false for a live entity's history.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
