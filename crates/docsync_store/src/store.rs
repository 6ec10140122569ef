//! The versioned entity store.

use crate::error::{StoreError, StoreResult};
use crate::meta::{meta_value, read_meta, strip_meta, META_FIELD};
use docsync_patch::{
    merge_for_storage, normalize, DocPath, Operator, Segment, UpdateOperation, UpdateStep,
};
use docsync_protocol::{DiffResult, MetaInfo, PushOutcome, VersionId};
use docsync_storage::{Filter, StorageBackend};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Decides whether a push whose base version left the retained history
/// window may proceed anyway.
///
/// The default policy refuses: unrecoverable diffs force the caller to
/// resend the full entity. A permissive validator lets the push apply
/// its operations to the current server state instead.
pub trait PushValidator: Send + Sync {
    /// Returns true to accept a push from an unrecoverable base version.
    fn allow_stale_push(&self, id: &str, version: &VersionId) -> bool;
}

/// The default validator: stale pushes are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefuseStale;

impl PushValidator for RefuseStale {
    fn allow_stale_push(&self, _id: &str, _version: &VersionId) -> bool {
        false
    }
}

/// A server-side entity store that attaches bounded version history to
/// every entity and reconciles client pushes.
///
/// The store is the only layer that knows about the reserved history
/// field; the backend below holds documents opaquely, and every document
/// handed to callers has the history stripped.
///
/// Each call reads-then-writes one entity's history atomically from the
/// caller's perspective; the backend is responsible for serializing
/// concurrent writers to the same id.
pub struct VersionedStore<B: StorageBackend> {
    backend: B,
    validator: Box<dyn PushValidator>,
}

impl<B: StorageBackend> VersionedStore<B> {
    /// Creates a store over a backend with the default stale-push policy.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            validator: Box::new(RefuseStale),
        }
    }

    /// Creates a store with a custom stale-push validator.
    pub fn with_validator(backend: B, validator: Box<dyn PushValidator>) -> Self {
        Self { backend, validator }
    }

    /// Stores a new entity, assigning a fresh id when absent and seeding
    /// its version history with a single empty-op entry.
    pub fn insert(&self, mut value: Value) -> StoreResult<(Value, VersionId)> {
        let fields = value
            .as_object_mut()
            .ok_or(docsync_storage::StorageError::NotAnObject)?;
        if fields.contains_key(META_FIELD) {
            return Err(StoreError::ReservedField {
                path: META_FIELD.into(),
            });
        }
        let meta = MetaInfo::initial();
        let version = meta.current();
        fields.insert(META_FIELD.into(), meta_value(&meta)?);

        let stored = self.backend.insert(value)?;
        debug!(id = %stored["id"], %version, "entity inserted");
        Ok((strip_meta(stored), version))
    }

    /// Returns the entity with the given id, history stripped.
    pub fn get(&self, id: &str) -> StoreResult<Value> {
        Ok(strip_meta(self.backend.get(id)?))
    }

    /// Returns the entity together with its current version, for callers
    /// that fall back to a full fetch when diffs are unrecoverable.
    pub fn fetch(&self, id: &str) -> StoreResult<(Value, VersionId)> {
        let stored = self.backend.get(id)?;
        let version = read_meta(id, &stored)?.current();
        Ok((strip_meta(stored), version))
    }

    /// Returns every entity matching the filter, history stripped.
    pub fn find(&self, filter: &Filter) -> StoreResult<Vec<Value>> {
        Ok(self
            .backend
            .find(filter)?
            .into_iter()
            .map(strip_meta)
            .collect())
    }

    /// Deletes the entity with the given id, history included.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.backend.delete(id)?;
        debug!(id, "entity deleted");
        Ok(())
    }

    /// Normalizes and applies a raw update, recording it in history.
    ///
    /// Returns the updated entity plus the new and previous version.
    pub fn update(&self, id: &str, raw: &Value) -> StoreResult<(Value, VersionId, VersionId)> {
        self.apply_update(id, normalize(raw)?)
    }

    /// Applies an already-normalized update, recording it in history.
    pub fn apply_update(
        &self,
        id: &str,
        operation: UpdateOperation,
    ) -> StoreResult<(Value, VersionId, VersionId)> {
        guard_reserved(&operation)?;

        let stored = self.backend.get(id)?;
        let mut meta = read_meta(id, &stored)?;
        let previous = meta.current();
        let version = meta.record(&operation)?;

        // The user steps and the history write land in one backend
        // update, so a failing operator leaves nothing behind.
        let mut steps: Vec<UpdateStep> = operation.steps().to_vec();
        steps.push(UpdateStep {
            op: Operator::Set,
            args: vec![(
                DocPath::parse(META_FIELD).expect("reserved field name parses"),
                meta_value(&meta)?,
            )],
        });
        let composed = UpdateOperation::from_steps(steps);

        let updated = self.backend.update(id, &composed)?;
        debug!(id, %previous, %version, "entity updated");
        Ok((strip_meta(updated), version, previous))
    }

    /// Returns what changed since `version`: up-to-date, an ordered diff
    /// list, or not-found when the version left the retained window.
    pub fn diff_since(&self, id: &str, version: &VersionId) -> StoreResult<DiffResult> {
        let stored = self.backend.get(id)?;
        let meta = read_meta(id, &stored)?;
        let result = meta.diff_since(version)?;
        if matches!(result, DiffResult::NotFound) {
            trace!(id, %version, "diff base version not in retained history");
        }
        Ok(result)
    }

    /// Merges a client's pushed operations into authoritative history.
    ///
    /// Exactly one outcome branch fires: a client that was current gets
    /// the fully updated entity; a client that was behind gets every
    /// operation recorded after its version (its own merged operation
    /// included) to rebase onto. A base version outside the retained
    /// window is rejected with [`StoreError::StaleVersion`] unless the
    /// store's validator allows it.
    pub fn push(
        &self,
        id: &str,
        version: &VersionId,
        operations: &[UpdateOperation],
    ) -> StoreResult<PushOutcome> {
        let behind = match self.diff_since(id, version)? {
            DiffResult::UpToDate { .. } => false,
            DiffResult::Diffs { .. } => true,
            DiffResult::NotFound => {
                if !self.validator.allow_stale_push(id, version) {
                    warn!(id, %version, "push rejected: version outside retained history");
                    return Err(StoreError::StaleVersion {
                        id: id.into(),
                        version: *version,
                    });
                }
                debug!(id, %version, "stale push accepted by validator");
                true
            }
        };

        if !operations.is_empty() {
            let merged = merge_for_storage(operations);
            self.apply_update(id, merged)?;
        }

        if behind {
            match self.diff_since(id, version)? {
                DiffResult::Diffs { operations, version } => {
                    Ok(PushOutcome::Diffs { operations, version })
                }
                // The validator accepted a version we cannot diff from;
                // the client rebuilds from the full entity.
                _ => {
                    let entity = self.get(id)?;
                    let stored = self.backend.get(id)?;
                    let meta = read_meta(id, &stored)?;
                    Ok(PushOutcome::Entity {
                        entity,
                        version: meta.current(),
                    })
                }
            }
        } else {
            let stored = self.backend.get(id)?;
            let meta = read_meta(id, &stored)?;
            Ok(PushOutcome::Entity {
                entity: strip_meta(stored),
                version: meta.current(),
            })
        }
    }

    /// Replaces an entity's contents wholesale, recording the change as
    /// a single history entry.
    ///
    /// This is the fallback after a rejected push: the client resends
    /// the full entity instead of a diff.
    pub fn replace(&self, id: &str, value: &Value) -> StoreResult<(Value, VersionId)> {
        let incoming = value
            .as_object()
            .ok_or(docsync_storage::StorageError::NotAnObject)?;
        let current = strip_meta(self.backend.get(id)?);
        let current_fields = current
            .as_object()
            .ok_or_else(|| StoreError::corrupt_meta(id))?;

        let mut set_args = Vec::new();
        for (field, field_value) in incoming {
            if field == META_FIELD {
                continue;
            }
            set_args.push((key_path(field), field_value.clone()));
        }
        let mut unset_args = Vec::new();
        for field in current_fields.keys() {
            if field != "id" && !incoming.contains_key(field) {
                unset_args.push((key_path(field), Value::String(String::new())));
            }
        }

        let mut steps = Vec::new();
        if !unset_args.is_empty() {
            steps.push(UpdateStep {
                op: Operator::Unset,
                args: unset_args,
            });
        }
        if !set_args.is_empty() {
            steps.push(UpdateStep {
                op: Operator::Set,
                args: set_args,
            });
        }

        let (entity, version, _) = self.apply_update(id, UpdateOperation::from_steps(steps))?;
        debug!(id, %version, "entity replaced");
        Ok((entity, version))
    }

    /// The entity's version history. Server-side only; history never
    /// travels with entities handed to external callers.
    pub(crate) fn meta(&self, id: &str) -> StoreResult<MetaInfo> {
        read_meta(id, &self.backend.get(id)?)
    }
}

/// A literal (non-parsed) top-level field name as a path.
fn key_path(field: &str) -> DocPath {
    let escaped = field
        .chars()
        .flat_map(|c| {
            let escape = c == '.' || c == '\\' || c == '[';
            escape.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect::<String>();
    DocPath::parse(&escaped).expect("escaped field name parses")
}

fn guard_reserved(operation: &UpdateOperation) -> StoreResult<()> {
    for step in operation.steps() {
        for (path, _) in &step.args {
            if matches!(path.segments().first(), Some(Segment::Key(key)) if key == META_FIELD) {
                return Err(StoreError::ReservedField {
                    path: path.to_string(),
                });
            }
        }
    }
    Ok(())
}
