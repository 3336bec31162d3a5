use std::collections::HashMap;
use std::sync::RwLock;

use corral_core::values::Document;
use corral_core::{ids, CorralError, CorralResult, WorkloadStore};
use tracing::debug;

type Key = (String, String);

/// In-RAM workload store keyed by kind and short id.
#[derive(Default)]
pub struct MemStore {
    docs: RwLock<HashMap<Key, Document>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(kind: &str, id: &str) -> Key {
        (kind.to_string(), ids::short_id(id).to_string())
    }

    fn poisoned() -> CorralError {
        CorralError::Internal("memstore lock poisoned".into())
    }
}

#[async_trait::async_trait]
impl WorkloadStore for MemStore {
    async fn create(&self, kind: &str, mut data: Document) -> CorralResult<Document> {
        let name = ids::stamp_created(kind, &mut data)?;
        let key = Self::key(kind, &name);
        let mut docs = self.docs.write().map_err(|_| Self::poisoned())?;
        if docs.contains_key(&key) {
            return Err(CorralError::Conflict(format!("{} already exists", ids::composite_id(kind, &name))));
        }
        docs.insert(key, data.clone());
        debug!(kind = %kind, name = %name, "memstore: created");
        Ok(data)
    }

    async fn update(&self, kind: &str, id: &str, mut data: Document) -> CorralResult<Document> {
        let key = Self::key(kind, id);
        let mut docs = self.docs.write().map_err(|_| Self::poisoned())?;
        let previous = docs.get(&key).ok_or_else(|| CorralError::NotFound(id.to_string()))?;
        ids::carry_stamps(previous, &mut data);
        docs.insert(key, data.clone());
        Ok(data)
    }

    async fn by_id(&self, kind: &str, id: &str) -> CorralResult<Document> {
        let docs = self.docs.read().map_err(|_| Self::poisoned())?;
        docs.get(&Self::key(kind, id))
            .cloned()
            .ok_or_else(|| CorralError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_read_update_cycle() {
        let store = MemStore::new();
        let created = store.create("deployment", doc(json!({ "name": "web", "scale": 1 }))).await.unwrap();
        assert_eq!(created["id"], json!("deployment:web"));
        assert_eq!(store.len(), 1);

        let read = store.by_id("deployment", "deployment:web").await.unwrap();
        assert_eq!(read, created);
        assert_eq!(store.by_id("deployment", "web").await.unwrap(), created);

        let updated = store.update("deployment", "deployment:web", doc(json!({ "name": "web", "scale": 3 }))).await.unwrap();
        assert_eq!(updated["scale"], json!(3));
        assert_eq!(updated["uuid"], created["uuid"]);
        assert_eq!(updated["id"], json!("deployment:web"));
    }

    #[tokio::test]
    async fn storage_errors() {
        let store = MemStore::new();
        store.create("job", doc(json!({ "name": "pi" }))).await.unwrap();
        let dup = store.create("job", doc(json!({ "name": "pi" }))).await.unwrap_err();
        assert_eq!(dup.code(), "Conflict");
        // same name under another kind is a different workload
        assert!(store.create("cronJob", doc(json!({ "name": "pi" }))).await.is_ok());

        let missing = store.by_id("job", "job:nope").await.unwrap_err();
        assert_eq!(missing.code(), "NotFound");
        let missing = store.update("job", "job:nope", Document::new()).await.unwrap_err();
        assert_eq!(missing.code(), "NotFound");
        let nameless = store.create("job", Document::new()).await.unwrap_err();
        assert_eq!(nameless.code(), "InvalidOption");
    }
}
