//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::filter::Filter;
use docsync_patch::UpdateOperation;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// An in-memory document backend.
///
/// Stores documents in a map guarded by a single lock, which also
/// serializes concurrent writers to the same id, satisfying the
/// atomicity the versioned store assumes. Suitable for tests and
/// ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.documents.write().clear();
    }
}

fn document_id(document: &Value) -> Option<String> {
    document
        .as_object()
        .and_then(|fields| fields.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl StorageBackend for MemoryBackend {
    fn find(&self, filter: &Filter) -> StorageResult<Vec<Value>> {
        let documents = self.documents.read();
        Ok(documents
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    fn get(&self, id: &str) -> StorageResult<Value> {
        self.documents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn insert(&self, mut document: Value) -> StorageResult<Value> {
        let fields = document
            .as_object_mut()
            .ok_or(StorageError::NotAnObject)?;
        let id = match fields.get("id").and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => {
                let fresh = Uuid::new_v4().to_string();
                fields.insert("id".into(), Value::String(fresh.clone()));
                fresh
            }
        };

        let mut documents = self.documents.write();
        if documents.contains_key(&id) {
            return Err(StorageError::duplicate_id(id));
        }
        documents.insert(id, document.clone());
        Ok(document)
    }

    fn update(&self, id: &str, operation: &UpdateOperation) -> StorageResult<Value> {
        let mut documents = self.documents.write();
        let current = documents
            .get(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        let updated = docsync_patch::apply(current, operation)?;
        documents.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        self.documents
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn delete_where(&self, filter: &Filter) -> StorageResult<usize> {
        let mut documents = self.documents.write();
        let doomed: Vec<String> = documents
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .filter_map(|(_, doc)| document_id(doc))
            .collect();
        for id in &doomed {
            documents.remove(id);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_patch::normalize;
    use serde_json::json;

    #[test]
    fn insert_assigns_id_when_absent() {
        let backend = MemoryBackend::new();
        let stored = backend.insert(json!({"name": "Jone"})).unwrap();
        let id = stored["id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert_eq!(backend.get(id).unwrap(), stored);
    }

    #[test]
    fn insert_keeps_existing_id() {
        let backend = MemoryBackend::new();
        let stored = backend.insert(json!({"id": "u1", "name": "Jone"})).unwrap();
        assert_eq!(stored["id"], json!("u1"));
    }

    #[test]
    fn insert_duplicate_id_rejected() {
        let backend = MemoryBackend::new();
        backend.insert(json!({"id": "u1"})).unwrap();
        let err = backend.insert(json!({"id": "u1"})).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId { .. }));
    }

    #[test]
    fn get_missing_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.get("nope"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn update_applies_operation() {
        let backend = MemoryBackend::new();
        backend.insert(json!({"id": "u1", "n": 1})).unwrap();
        let op = normalize(&json!({"$inc": {"n": 2}})).unwrap();
        let updated = backend.update("u1", &op).unwrap();
        assert_eq!(updated, json!({"id": "u1", "n": 3}));
        assert_eq!(backend.get("u1").unwrap(), updated);
    }

    #[test]
    fn find_with_filter() {
        let backend = MemoryBackend::new();
        backend.insert(json!({"id": "a", "kind": "x"})).unwrap();
        backend.insert(json!({"id": "b", "kind": "y"})).unwrap();
        let found = backend
            .find(&Filter::all().with_eq("kind", json!("x")))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], json!("a"));
    }

    #[test]
    fn delete_and_delete_where() {
        let backend = MemoryBackend::new();
        backend.insert(json!({"id": "a", "kind": "x"})).unwrap();
        backend.insert(json!({"id": "b", "kind": "x"})).unwrap();
        backend.insert(json!({"id": "c", "kind": "y"})).unwrap();

        backend.delete("a").unwrap();
        assert_eq!(backend.len(), 2);

        let removed = backend
            .delete_where(&Filter::all().with_eq("kind", json!("x")))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.len(), 1);
    }
}
