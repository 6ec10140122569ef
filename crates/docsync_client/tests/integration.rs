//! End-to-end client/server reconciliation over an in-process server.

use docsync_client::{ClientError, PushStatus, SyncClient, SyncTransport};
use docsync_protocol::{
    FetchResponse, PullRequest, PullResponse, PushRequest, PushResponse, VersionId,
};
use docsync_storage::MemoryBackend;
use docsync_store::{StoreError, VersionedStore};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A transport that calls a versioned store directly, with a switch to
/// simulate outages.
struct LoopbackServer {
    stores: Mutex<HashMap<String, Arc<VersionedStore<MemoryBackend>>>>,
    offline: AtomicBool,
}

impl LoopbackServer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stores: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        })
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn store(&self, entity_name: &str) -> Arc<VersionedStore<MemoryBackend>> {
        self.stores
            .lock()
            .entry(entity_name.to_string())
            .or_insert_with(|| Arc::new(VersionedStore::new(MemoryBackend::new())))
            .clone()
    }

    fn insert(&self, entity_name: &str, value: Value) -> (Value, VersionId) {
        self.store(entity_name).insert(value).unwrap()
    }

    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ClientError::network("connection refused"))
        } else {
            Ok(())
        }
    }
}

/// One client's handle onto the shared loopback server.
#[derive(Clone)]
struct LoopbackTransport {
    server: Arc<LoopbackServer>,
}

fn map_store_error(entity_name: &str, err: StoreError) -> ClientError {
    match err {
        StoreError::StaleVersion { id, version } => ClientError::Stale {
            entity_name: entity_name.to_string(),
            id,
            version,
        },
        other => ClientError::Server(other.to_string()),
    }
}

impl SyncTransport for LoopbackTransport {
    fn push(&self, request: &PushRequest) -> Result<PushResponse, ClientError> {
        self.server.check_reachable()?;
        let store = self.server.store(&request.entity_name);
        let outcome = store
            .push(&request.id, &request.version, &request.operations)
            .map_err(|e| map_store_error(&request.entity_name, e))?;
        Ok(PushResponse { outcome })
    }

    fn pull(&self, request: &PullRequest) -> Result<PullResponse, ClientError> {
        self.server.check_reachable()?;
        let store = self.server.store(&request.entity_name);
        let result = store
            .diff_since(&request.id, &request.version)
            .map_err(|e| map_store_error(&request.entity_name, e))?;
        Ok(PullResponse::new(result))
    }

    fn fetch(&self, entity_name: &str, id: &str) -> Result<FetchResponse, ClientError> {
        self.server.check_reachable()?;
        let store = self.server.store(entity_name);
        let (entity, version) = store
            .fetch(id)
            .map_err(|e| map_store_error(entity_name, e))?;
        Ok(FetchResponse::new(entity, version))
    }

    fn is_connected(&self) -> bool {
        !self.server.offline.load(Ordering::SeqCst)
    }
}

fn client_for(server: &Arc<LoopbackServer>) -> SyncClient<LoopbackTransport> {
    SyncClient::new(LoopbackTransport {
        server: server.clone(),
    })
}

fn id_of(entity: &Value) -> String {
    entity["id"].as_str().unwrap().to_string()
}

#[test]
fn commit_push_confirms_against_live_server() {
    let server = LoopbackServer::new();
    let (entity, version) = server.insert("users", json!({"name": "Jone"}));
    let id = id_of(&entity);

    let client = client_for(&server);
    client.follow("users", &id, entity, version);

    client
        .commit("users", &id, &json!({"$set": {"name": "John"}}))
        .unwrap();
    let status = client.push("users", &id).unwrap();

    assert_eq!(status, PushStatus::Confirmed);
    assert_eq!(client.origin("users", &id).unwrap()["name"], json!("John"));
    assert_eq!(client.pending_commits("users", &id).unwrap(), 0);
    assert_eq!(
        server.store("users").get(&id).unwrap()["name"],
        json!("John")
    );
}

#[test]
fn outage_queues_commits_until_repush() {
    let server = LoopbackServer::new();
    let (entity, version) = server.insert("users", json!({"name": "Jone"}));
    let id = id_of(&entity);

    let client = client_for(&server);
    client.follow("users", &id, entity, version);
    client
        .commit("users", &id, &json!({"$set": {"name": "John"}}))
        .unwrap();

    server.set_offline(true);
    assert_eq!(client.push("users", &id).unwrap(), PushStatus::Deferred);
    assert!(!client.is_online());

    let unreached = client.unreached_commits();
    assert_eq!(unreached.len(), 1);
    assert_eq!(unreached[0].id, id);
    assert_eq!(unreached[0].commit_count, 1);
    assert_eq!(client.origin("users", &id).unwrap()["name"], json!("Jone"));
    assert_eq!(client.pending_commits("users", &id).unwrap(), 1);
    assert_eq!(
        server.store("users").get(&id).unwrap()["name"],
        json!("Jone")
    );

    // A second failed attempt keeps one entry of one commit.
    assert_eq!(client.push("users", &id).unwrap(), PushStatus::Deferred);
    assert_eq!(client.unreached_commits().len(), 1);

    server.set_offline(false);
    client.repush().unwrap();

    assert!(client.unreached_commits().is_empty());
    assert!(client.is_online());
    assert_eq!(client.origin("users", &id).unwrap()["name"], json!("John"));
    assert_eq!(client.pending_commits("users", &id).unwrap(), 0);
    assert_eq!(
        server.store("users").get(&id).unwrap()["name"],
        json!("John")
    );
}

#[test]
fn diverged_push_rebases_pending_edits_onto_server_state() {
    let server = LoopbackServer::new();
    let (entity, version) = server.insert("notes", json!({"n": 0, "tags": []}));
    let id = id_of(&entity);

    let writer = client_for(&server);
    writer.follow("notes", &id, entity.clone(), version);

    let reader = client_for(&server);
    reader.follow("notes", &id, entity, version);

    // The writer advances the server first.
    writer
        .commit("notes", &id, &json!({"$set": {"n": 5}}))
        .unwrap();
    assert_eq!(writer.push("notes", &id).unwrap(), PushStatus::Confirmed);

    // The reader queues two commits and pushes only the first.
    reader
        .commit("notes", &id, &json!({"$push": {"tags": "mine"}}))
        .unwrap();
    reader
        .commit("notes", &id, &json!({"$push": {"tags": "later"}}))
        .unwrap();
    let status = reader.push_up_to("notes", &id, 1).unwrap();
    assert_eq!(status, PushStatus::Rebased);

    // Origin caught up with the server: writer's change plus the pushed
    // commit, but not the unpushed one.
    let origin = reader.origin("notes", &id).unwrap();
    assert_eq!(origin["n"], json!(5));
    assert_eq!(origin["tags"], json!(["mine"]));
    assert_eq!(origin, server.store("notes").get(&id).unwrap());

    // The unpushed commit replayed on top of the new origin.
    let head = reader.current("notes", &id).unwrap();
    assert_eq!(head["n"], json!(5));
    assert_eq!(head["tags"], json!(["mine", "later"]));
    assert_eq!(reader.pending_commits("notes", &id).unwrap(), 1);
}

#[test]
fn pull_rebases_without_consuming_commits() {
    let server = LoopbackServer::new();
    let (entity, version) = server.insert("notes", json!({"n": 0, "tags": []}));
    let id = id_of(&entity);

    let writer = client_for(&server);
    writer.follow("notes", &id, entity.clone(), version);
    let reader = client_for(&server);
    reader.follow("notes", &id, entity, version);

    writer
        .commit("notes", &id, &json!({"$inc": {"n": 3}}))
        .unwrap();
    writer.push("notes", &id).unwrap();

    reader
        .commit("notes", &id, &json!({"$push": {"tags": "draft"}}))
        .unwrap();
    reader.pull("notes", &id).unwrap();

    let origin = reader.origin("notes", &id).unwrap();
    assert_eq!(origin["n"], json!(3));
    assert_eq!(origin["tags"], json!([]));

    let head = reader.current("notes", &id).unwrap();
    assert_eq!(head["n"], json!(3));
    assert_eq!(head["tags"], json!(["draft"]));
    assert_eq!(reader.pending_commits("notes", &id).unwrap(), 1);
}

#[test]
fn stale_client_recovers_through_full_fetch() {
    let server = LoopbackServer::new();
    let (entity, version) = server.insert("counters", json!({"n": 0}));
    let id = id_of(&entity);

    let stale = client_for(&server);
    stale.follow("counters", &id, entity, version);

    // Another writer pushes the entity far past the retained window.
    let writer = client_for(&server);
    let (current, current_version) = server.store("counters").fetch(&id).unwrap();
    writer.follow("counters", &id, current, current_version);
    for i in 0..110 {
        writer
            .commit("counters", &id, &json!({"$set": {"n": i}}))
            .unwrap();
        writer.push("counters", &id).unwrap();
    }

    // The stale client's push is rejected outright.
    stale
        .commit("counters", &id, &json!({"$set": {"label": "mine"}}))
        .unwrap();
    let err = stale.push("counters", &id).unwrap_err();
    assert!(matches!(err, ClientError::Stale { .. }));
    assert_eq!(stale.pending_commits("counters", &id).unwrap(), 1);

    // Pull falls back to a full fetch, after which the push goes through.
    stale.pull("counters", &id).unwrap();
    assert_eq!(stale.origin("counters", &id).unwrap()["n"], json!(109));
    assert_eq!(stale.push("counters", &id).unwrap(), PushStatus::Confirmed);

    let final_doc = server.store("counters").get(&id).unwrap();
    assert_eq!(final_doc["n"], json!(109));
    assert_eq!(final_doc["label"], json!("mine"));
}

#[test]
fn synchronize_refreshes_every_followed_entity() {
    let server = LoopbackServer::new();
    let (a, a_version) = server.insert("users", json!({"name": "Jone"}));
    let (b, b_version) = server.insert("notes", json!({"text": "hi"}));
    let a_id = id_of(&a);
    let b_id = id_of(&b);

    let reader = client_for(&server);
    reader.follow("users", &a_id, a, a_version);
    reader.follow("notes", &b_id, b, b_version);

    server
        .store("users")
        .update(&a_id, &json!({"$set": {"name": "John"}}))
        .unwrap();
    server
        .store("notes")
        .update(&b_id, &json!({"$set": {"text": "bye"}}))
        .unwrap();

    reader.synchronize().unwrap();
    assert_eq!(reader.origin("users", &a_id).unwrap()["name"], json!("John"));
    assert_eq!(reader.origin("notes", &b_id).unwrap()["text"], json!("bye"));
}

#[test]
fn entities_fail_independently() {
    let server = LoopbackServer::new();
    let (a, a_version) = server.insert("users", json!({"name": "Jone"}));
    let a_id = id_of(&a);
    let (b, b_version) = server.insert("notes", json!({"text": "hi"}));
    let b_id = id_of(&b);

    let client = client_for(&server);
    client.follow("users", &a_id, a, a_version);
    client.follow("notes", &b_id, b, b_version);

    client
        .commit("users", &a_id, &json!({"$set": {"name": "John"}}))
        .unwrap();
    client
        .commit("notes", &b_id, &json!({"$set": {"text": "bye"}}))
        .unwrap();

    server.set_offline(true);
    client.push("users", &a_id).unwrap();
    server.set_offline(false);
    client.push("notes", &b_id).unwrap();

    // Only the entity pushed during the outage is queued.
    let unreached = client.unreached_commits();
    assert_eq!(unreached.len(), 1);
    assert_eq!(unreached[0].id, a_id);
    assert_eq!(
        server.store("notes").get(&b_id).unwrap()["text"],
        json!("bye")
    );
}
