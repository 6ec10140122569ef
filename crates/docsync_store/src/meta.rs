//! Attaching, reading and stripping version history on stored documents.

use crate::error::{StoreError, StoreResult};
use docsync_protocol::MetaInfo;
use serde_json::Value;

/// The reserved document field holding version history.
pub const META_FIELD: &str = "_meta";

/// Reads the version history attached to a stored document.
pub fn read_meta(id: &str, document: &Value) -> StoreResult<MetaInfo> {
    let raw = document
        .get(META_FIELD)
        .ok_or_else(|| StoreError::corrupt_meta(id))?;
    let meta: MetaInfo =
        serde_json::from_value(raw.clone()).map_err(|_| StoreError::corrupt_meta(id))?;
    if meta.is_empty() {
        return Err(StoreError::corrupt_meta(id));
    }
    Ok(meta)
}

/// Serializes version history into a document value.
pub fn meta_value(meta: &MetaInfo) -> StoreResult<Value> {
    serde_json::to_value(meta).map_err(|_| StoreError::corrupt_meta("<unsaved>"))
}

/// Removes the reserved history field from a document.
///
/// Every externally visible document goes through this; history must
/// never leak to callers.
pub fn strip_meta(mut document: Value) -> Value {
    if let Some(fields) = document.as_object_mut() {
        fields.remove(META_FIELD);
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_removes_reserved_field() {
        let meta = MetaInfo::initial();
        let doc = json!({"id": "a", "name": "Jone", META_FIELD: meta_value(&meta).unwrap()});
        let stripped = strip_meta(doc);
        assert_eq!(stripped, json!({"id": "a", "name": "Jone"}));
    }

    #[test]
    fn read_roundtrips_through_document() {
        let meta = MetaInfo::initial();
        let doc = json!({"id": "a", META_FIELD: meta_value(&meta).unwrap()});
        let read = read_meta("a", &doc).unwrap();
        assert_eq!(read, meta);
    }

    #[test]
    fn missing_meta_is_corrupt() {
        let err = read_meta("a", &json!({"id": "a"})).unwrap_err();
        assert!(matches!(err, StoreError::CorruptMeta { .. }));
    }
}
