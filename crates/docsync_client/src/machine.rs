//! The optimistic sync client.

use crate::error::{ClientError, ClientResult};
use crate::state::{EntityKey, LocalEntityState, UnreachedCommit};
use crate::transport::SyncTransport;
use docsync_patch::normalize;
use docsync_protocol::{DiffResult, PullRequest, PushOutcome, PushRequest, VersionId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a push attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    /// The server confirmed the pushed commits; origin is current.
    Confirmed,
    /// The server had diverged; origin was rebased from its diffs.
    Rebased,
    /// The network failed; the commits stay queued as unreached.
    Deferred,
}

/// A client-side cache of followed entities with optimistic local edits.
///
/// Commits apply locally before server confirmation and queue until a
/// push succeeds. Pushes for one entity are serialized behind its state
/// lock; different entities proceed independently.
pub struct SyncClient<T: SyncTransport> {
    transport: Arc<T>,
    entities: RwLock<HashMap<EntityKey, Arc<Mutex<LocalEntityState>>>>,
    unreached: Mutex<Vec<UnreachedCommit>>,
    online: AtomicBool,
}

impl<T: SyncTransport> SyncClient<T> {
    /// Creates a client over a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            entities: RwLock::new(HashMap::new()),
            unreached: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Starts following a server-confirmed entity.
    pub fn follow(
        &self,
        entity_name: &str,
        id: &str,
        entity: Value,
        version: VersionId,
    ) {
        let key = EntityKey::new(entity_name, id);
        let state = LocalEntityState::new(entity, version);
        self.entities
            .write()
            .insert(key, Arc::new(Mutex::new(state)));
        debug!(entity_name, id, %version, "following entity");
    }

    /// Stops following an entity, dropping any unconfirmed commits.
    pub fn unfollow(&self, entity_name: &str, id: &str) {
        let key = EntityKey::new(entity_name, id);
        self.entities.write().remove(&key);
        self.unreached
            .lock()
            .retain(|u| u.entity_name != entity_name || u.id != id);
        debug!(entity_name, id, "unfollowed entity");
    }

    /// Returns true if the client follows this entity.
    pub fn is_following(&self, entity_name: &str, id: &str) -> bool {
        self.entities
            .read()
            .contains_key(&EntityKey::new(entity_name, id))
    }

    /// The current local view of an entity: pending commits included.
    pub fn current(&self, entity_name: &str, id: &str) -> ClientResult<Value> {
        Ok(self.state_of(entity_name, id)?.lock().current().clone())
    }

    /// The last server-confirmed document, pending commits excluded.
    pub fn origin(&self, entity_name: &str, id: &str) -> ClientResult<Value> {
        Ok(self.state_of(entity_name, id)?.lock().origin().clone())
    }

    /// The last server-confirmed version of an entity.
    pub fn version(&self, entity_name: &str, id: &str) -> ClientResult<VersionId> {
        Ok(self.state_of(entity_name, id)?.lock().version())
    }

    /// How many unconfirmed commits are queued for an entity.
    pub fn pending_commits(&self, entity_name: &str, id: &str) -> ClientResult<usize> {
        Ok(self.state_of(entity_name, id)?.lock().commits().len())
    }

    /// Commits that failed to reach the server and await a repush.
    pub fn unreached_commits(&self) -> Vec<UnreachedCommit> {
        self.unreached.lock().clone()
    }

    /// Returns false after a transport failure, until a call succeeds.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Applies an update locally and queues it for the next push.
    ///
    /// Returns the new local view. The entity must be followed.
    pub fn commit(&self, entity_name: &str, id: &str, raw: &Value) -> ClientResult<Value> {
        let operation = normalize(raw)?;
        let state_arc = self.state_of(entity_name, id)?;
        let mut state = state_arc.lock();
        let head = state.commit(operation)?.clone();
        debug!(entity_name, id, pending = state.commits().len(), "commit queued");
        Ok(head)
    }

    /// Pushes every queued commit for an entity.
    pub fn push(&self, entity_name: &str, id: &str) -> ClientResult<PushStatus> {
        self.push_up_to(entity_name, id, usize::MAX)
    }

    /// Pushes up to `count` leading commits for an entity.
    ///
    /// A network failure queues the in-flight commits as unreached and
    /// resolves to [`PushStatus::Deferred`] instead of an error; local
    /// state is never touched on failure. Other server rejections
    /// surface as errors.
    pub fn push_up_to(&self, entity_name: &str, id: &str, count: usize) -> ClientResult<PushStatus> {
        let state_arc = self.state_of(entity_name, id)?;
        // Holding the entity lock across the round trip keeps pushes for
        // one id strictly ordered.
        let mut state = state_arc.lock();

        let in_flight = count.min(state.commits().len());
        if in_flight == 0 {
            return Ok(PushStatus::Confirmed);
        }

        let request = PushRequest::new(
            entity_name,
            id,
            state.version(),
            state.commits()[..in_flight].to_vec(),
        );

        let response = match self.transport.push(&request) {
            Ok(response) => response,
            Err(err) if err.is_network() => {
                self.online.store(false, Ordering::SeqCst);
                self.record_unreached(entity_name, id, in_flight);
                warn!(entity_name, id, in_flight, "push unreached, queued for repush");
                return Ok(PushStatus::Deferred);
            }
            Err(err) => return Err(err),
        };
        self.online.store(true, Ordering::SeqCst);

        let status = match response.outcome {
            PushOutcome::Entity { entity, version } => {
                state.confirm(entity, version, in_flight)?;
                PushStatus::Confirmed
            }
            PushOutcome::Diffs { operations, version } => {
                state.rebase_push(&operations, version, in_flight)?;
                PushStatus::Rebased
            }
        };
        self.clear_unreached(entity_name, id, in_flight);
        debug!(entity_name, id, ?status, "push resolved");
        Ok(status)
    }

    /// Retries the push for every entity with unreached commits.
    ///
    /// Entities that fail again stay queued untouched; the first
    /// non-network error aborts the sweep.
    pub fn repush(&self) -> ClientResult<()> {
        let pending = self.unreached_commits();
        for unreached in pending {
            let status =
                self.push_up_to(&unreached.entity_name, &unreached.id, unreached.commit_count)?;
            if status == PushStatus::Deferred {
                debug!(
                    entity_name = %unreached.entity_name,
                    id = %unreached.id,
                    "repush still unreached"
                );
            }
        }
        Ok(())
    }

    /// Refreshes one entity from the server outside of a push.
    ///
    /// Diffs advance `origin` and queued commits replay on top; a
    /// version outside the server's retained history falls back to a
    /// full fetch.
    pub fn pull(&self, entity_name: &str, id: &str) -> ClientResult<()> {
        let state_arc = self.state_of(entity_name, id)?;
        let mut state = state_arc.lock();

        let request = PullRequest::new(entity_name, id, state.version());
        let response = match self.transport.pull(&request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_network() {
                    self.online.store(false, Ordering::SeqCst);
                }
                return Err(err);
            }
        };
        self.online.store(true, Ordering::SeqCst);

        match response.result {
            DiffResult::UpToDate { .. } => Ok(()),
            DiffResult::Diffs { operations, version } => {
                debug!(entity_name, id, diffs = operations.len(), "pulled diffs");
                state.rebase_pull(&operations, version)
            }
            DiffResult::NotFound => {
                debug!(entity_name, id, "history window passed, fetching full entity");
                let fetched = self.transport.fetch(entity_name, id)?;
                state.reset_origin(fetched.entity, fetched.version)
            }
        }
    }

    /// Pulls every followed entity.
    pub fn synchronize(&self) -> ClientResult<()> {
        let keys: Vec<EntityKey> = self.entities.read().keys().cloned().collect();
        for key in keys {
            self.pull(&key.entity_name, &key.id)?;
        }
        Ok(())
    }

    fn state_of(&self, entity_name: &str, id: &str) -> ClientResult<Arc<Mutex<LocalEntityState>>> {
        self.entities
            .read()
            .get(&EntityKey::new(entity_name, id))
            .cloned()
            .ok_or_else(|| ClientError::no_entity(entity_name, id))
    }

    fn record_unreached(&self, entity_name: &str, id: &str, in_flight: usize) {
        let mut unreached = self.unreached.lock();
        match unreached
            .iter_mut()
            .find(|u| u.entity_name == entity_name && u.id == id)
        {
            // The in-flight prefix already covers any earlier failure.
            Some(entry) => entry.commit_count = entry.commit_count.max(in_flight),
            None => unreached.push(UnreachedCommit {
                entity_name: entity_name.into(),
                id: id.into(),
                commit_count: in_flight,
            }),
        }
    }

    fn clear_unreached(&self, entity_name: &str, id: &str, pushed: usize) {
        let mut unreached = self.unreached.lock();
        if let Some(pos) = unreached
            .iter()
            .position(|u| u.entity_name == entity_name && u.id == id)
        {
            if unreached[pos].commit_count <= pushed {
                unreached.remove(pos);
            } else {
                unreached[pos].commit_count -= pushed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use docsync_protocol::{FetchResponse, PullResponse, PushResponse};
    use serde_json::json;

    fn followed_client() -> (SyncClient<MockTransport>, VersionId) {
        let client = SyncClient::new(MockTransport::new());
        let version = VersionId::new();
        client.follow("users", "u1", json!({"id": "u1", "name": "Jone"}), version);
        (client, version)
    }

    #[test]
    fn commit_requires_follow() {
        let client = SyncClient::new(MockTransport::new());
        let err = client
            .commit("users", "ghost", &json!({"$set": {"a": 1}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::NoEntity { .. }));
    }

    #[test]
    fn commit_updates_local_view_only() {
        let (client, _) = followed_client();
        let head = client
            .commit("users", "u1", &json!({"$set": {"name": "John"}}))
            .unwrap();
        assert_eq!(head["name"], json!("John"));
        assert_eq!(client.origin("users", "u1").unwrap()["name"], json!("Jone"));
        assert_eq!(client.pending_commits("users", "u1").unwrap(), 1);
    }

    #[test]
    fn push_confirmation_folds_into_origin() {
        let (client, _) = followed_client();
        client
            .commit("users", "u1", &json!({"$set": {"name": "John"}}))
            .unwrap();

        let confirmed = VersionId::new();
        client.transport.set_push_response(PushResponse::entity(
            json!({"id": "u1", "name": "John"}),
            confirmed,
        ));

        let status = client.push("users", "u1").unwrap();
        assert_eq!(status, PushStatus::Confirmed);
        assert_eq!(client.origin("users", "u1").unwrap()["name"], json!("John"));
        assert_eq!(client.pending_commits("users", "u1").unwrap(), 0);
        assert_eq!(client.version("users", "u1").unwrap(), confirmed);
    }

    #[test]
    fn push_with_nothing_queued_is_a_no_op() {
        let (client, version) = followed_client();
        assert_eq!(client.push("users", "u1").unwrap(), PushStatus::Confirmed);
        assert_eq!(client.version("users", "u1").unwrap(), version);
    }

    #[test]
    fn network_failure_defers_and_queues_unreached() {
        let (client, version) = followed_client();
        client
            .commit("users", "u1", &json!({"$set": {"name": "John"}}))
            .unwrap();

        client.transport.set_connected(false);
        let status = client.push("users", "u1").unwrap();
        assert_eq!(status, PushStatus::Deferred);
        assert!(!client.is_online());

        let unreached = client.unreached_commits();
        assert_eq!(
            unreached,
            vec![UnreachedCommit {
                entity_name: "users".into(),
                id: "u1".into(),
                commit_count: 1,
            }]
        );

        // Local state untouched.
        assert_eq!(client.origin("users", "u1").unwrap()["name"], json!("Jone"));
        assert_eq!(client.pending_commits("users", "u1").unwrap(), 1);
        assert_eq!(client.version("users", "u1").unwrap(), version);
    }

    #[test]
    fn repeated_failures_do_not_duplicate_unreached() {
        let (client, _) = followed_client();
        client
            .commit("users", "u1", &json!({"$set": {"a": 1}}))
            .unwrap();
        client.transport.set_connected(false);
        client.push("users", "u1").unwrap();

        client
            .commit("users", "u1", &json!({"$set": {"b": 2}}))
            .unwrap();
        client.push("users", "u1").unwrap();

        let unreached = client.unreached_commits();
        assert_eq!(unreached.len(), 1);
        assert_eq!(unreached[0].commit_count, 2);
    }

    #[test]
    fn repush_clears_unreached_on_success() {
        let (client, _) = followed_client();
        client
            .commit("users", "u1", &json!({"$set": {"name": "John"}}))
            .unwrap();
        client.transport.set_connected(false);
        client.push("users", "u1").unwrap();

        client.transport.set_connected(true);
        client.transport.set_push_response(PushResponse::entity(
            json!({"id": "u1", "name": "John"}),
            VersionId::new(),
        ));
        client.repush().unwrap();

        assert!(client.unreached_commits().is_empty());
        assert!(client.is_online());
        assert_eq!(client.origin("users", "u1").unwrap()["name"], json!("John"));
        assert_eq!(client.pending_commits("users", "u1").unwrap(), 0);
    }

    #[test]
    fn pull_not_found_falls_back_to_fetch() {
        let (client, _) = followed_client();
        client.transport.set_pull_response(PullResponse::new(DiffResult::NotFound));

        let fresh = VersionId::new();
        client.transport.set_fetch_response(FetchResponse::new(
            json!({"id": "u1", "name": "Johnny"}),
            fresh,
        ));

        client.pull("users", "u1").unwrap();
        assert_eq!(client.origin("users", "u1").unwrap()["name"], json!("Johnny"));
        assert_eq!(client.version("users", "u1").unwrap(), fresh);
    }

    #[test]
    fn unfollow_drops_state_and_unreached() {
        let (client, _) = followed_client();
        client
            .commit("users", "u1", &json!({"$set": {"a": 1}}))
            .unwrap();
        client.transport.set_connected(false);
        client.push("users", "u1").unwrap();

        client.unfollow("users", "u1");
        assert!(!client.is_following("users", "u1"));
        assert!(client.unreached_commits().is_empty());
    }
}
