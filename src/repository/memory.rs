//! In-memory document store for dry runs and tests.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{DocumentStore, Fields, QueryOp, StoreError, StoreResult, StoredDocument};

/// Documents kept in insertion order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Vec<StoredDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }

    /// Copy of every stored document, in insertion order.
    pub async fn snapshot(&self) -> Vec<StoredDocument> {
        self.documents.lock().await.clone()
    }
}

fn field_matches(fields: &Fields, field: &str, op: QueryOp, value: &Value) -> bool {
    match (op, fields.get(field)) {
        (QueryOp::Equals, Some(Value::Array(_))) => false,
        (QueryOp::Equals, Some(found)) => found == value,
        (QueryOp::ArrayContains, Some(Value::Array(items))) => items.contains(value),
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Fields>> {
        let documents = self.documents.lock().await;
        Ok(documents
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.fields.clone()))
    }

    async fn set(&self, id: &str, fields: Fields) -> StoreResult<()> {
        let mut documents = self.documents.lock().await;
        match documents.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.fields = fields,
            None => documents.push(StoredDocument {
                id: id.to_string(),
                fields,
            }),
        }
        Ok(())
    }

    async fn update(&self, id: &str, fields: Fields) -> StoreResult<()> {
        let mut documents = self.documents.lock().await;
        let existing = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        existing.fields.extend(fields);
        Ok(())
    }

    async fn query(
        &self,
        field: &str,
        op: QueryOp,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<StoredDocument>> {
        let documents = self.documents.lock().await;
        Ok(documents
            .iter()
            .filter(|d| field_matches(&d.fields, field, op, value))
            .take(limit)
            .cloned()
            .collect())
    }
}
