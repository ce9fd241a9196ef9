//! SQLite-backed document store.
//!
//! Documents are stored as JSON in `documents`; every top-level scalar and
//! every element of a top-level array is mirrored into `document_fields` so
//! equality and array-contains queries hit an index.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use serde_json::Value;
use tracing::debug;

use super::{
    connect, DocumentStore, Fields, OptionalExt, QueryOp, StoreError, StoreResult, StoredDocument,
};

const KIND_SCALAR: &str = "scalar";
const KIND_ELEMENT: &str = "element";

pub struct SqliteDocumentStore {
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    /// Open the store, creating the schema. Failure here is fatal for a run.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store
            .init_schema()
            .map_err(|e| StoreError::Connection(format!("{}: {}", db_path.display(), e)))?;
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = connect(&self.db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                fields TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS document_fields (
                document_id TEXT NOT NULL,
                field TEXT NOT NULL,
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (document_id, field, kind, value),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            );

            CREATE INDEX IF NOT EXISTS idx_document_fields_lookup
                ON document_fields(field, kind, value);
        "#,
        )?;
        Ok(())
    }

    /// Number of stored documents.
    pub async fn count(&self) -> StoreResult<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    /// Run `f` with a fresh connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path)
                .map_err(|e| StoreError::Connection(format!("{}: {}", path.display(), e)))?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("store task failed: {}", e)))?
    }
}

fn load(conn: &Connection, id: &str) -> Result<Option<Fields>, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT fields FROM documents WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Index value text: strings as-is, everything else as JSON.
fn index_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
        other => Some(other.to_string()),
    }
}

/// Write the document body and rebuild its field index.
fn write_document(tx: &Transaction<'_>, id: &str, fields: &Fields) -> StoreResult<()> {
    let json = serde_json::to_string(fields)?;
    let now = Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO documents (id, fields, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
        params![id, json, now],
    )
    .map_err(|e| StoreError::write(id, e))?;

    tx.execute("DELETE FROM document_fields WHERE document_id = ?", params![id])
        .map_err(|e| StoreError::write(id, e))?;

    let mut insert = tx
        .prepare(
            "INSERT OR IGNORE INTO document_fields (document_id, field, kind, value)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(|e| StoreError::write(id, e))?;

    for (field, value) in fields {
        let entries: Vec<(&str, String)> = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(index_value)
                .map(|v| (KIND_ELEMENT, v))
                .collect(),
            scalar => index_value(scalar)
                .map(|v| vec![(KIND_SCALAR, v)])
                .unwrap_or_default(),
        };
        for (kind, v) in entries {
            insert
                .execute(params![id, field, kind, v])
                .map_err(|e| StoreError::write(id, e))?;
        }
    }

    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Fields>> {
        let id = id.to_string();
        self.blocking(move |conn| load(&conn, &id)).await
    }

    async fn set(&self, id: &str, fields: Fields) -> StoreResult<()> {
        let id = id.to_string();
        self.blocking(move |mut conn| {
            let tx = conn.transaction().map_err(|e| StoreError::write(&id, e))?;
            write_document(&tx, &id, &fields)?;
            tx.commit().map_err(|e| StoreError::write(&id, e))?;
            debug!("Stored document {}", id);
            Ok(())
        })
        .await
    }

    async fn update(&self, id: &str, fields: Fields) -> StoreResult<()> {
        let id = id.to_string();
        self.blocking(move |mut conn| {
            let tx = conn.transaction().map_err(|e| StoreError::write(&id, e))?;
            let mut merged = load(&tx, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            merged.extend(fields);
            write_document(&tx, &id, &merged)?;
            tx.commit().map_err(|e| StoreError::write(&id, e))?;
            debug!("Updated document {}", id);
            Ok(())
        })
        .await
    }

    async fn query(
        &self,
        field: &str,
        op: QueryOp,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<StoredDocument>> {
        let Some(value) = index_value(value) else {
            return Ok(Vec::new());
        };
        let field = field.to_string();
        let kind = match op {
            QueryOp::Equals => KIND_SCALAR,
            QueryOp::ArrayContains => KIND_ELEMENT,
        };

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.fields FROM documents d
                 JOIN document_fields f ON f.document_id = d.id
                 WHERE f.field = ?1 AND f.kind = ?2 AND f.value = ?3
                 ORDER BY d.seq
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(params![field, kind, value, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, json)| -> StoreResult<StoredDocument> {
                    Ok(StoredDocument {
                        id,
                        fields: serde_json::from_str(&json)?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_set_get_and_replace() {
        let dir = tempdir().unwrap();
        let store = SqliteDocumentStore::open(&dir.path().join("db/cases.db")).unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        store
            .set("a", fields(json!({"title": "one", "keywords": ["投資"]})))
            .await
            .unwrap();
        store
            .set("a", fields(json!({"title": "two", "keywords": []})))
            .await
            .unwrap();

        let doc = store.get("a").await.unwrap().unwrap();
        assert_eq!(doc["title"], "two");
        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store
            .query("keywords", QueryOp::ArrayContains, &json!("投資"), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let dir = tempdir().unwrap();
        let store = SqliteDocumentStore::open(&dir.path().join("cases.db")).unwrap();

        let missing = store.update("x", fields(json!({"title": "t"}))).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store
            .set("x", fields(json!({"title": "t", "date": "113-01-01"})))
            .await
            .unwrap();
        store
            .update("x", fields(json!({"title": "new"})))
            .await
            .unwrap();
        let doc = store.get("x").await.unwrap().unwrap();
        assert_eq!(doc["title"], "new");
        assert_eq!(doc["date"], "113-01-01");

        let hits = store
            .query("title", QueryOp::Equals, &json!("new"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "x");
    }

    #[tokio::test]
    async fn test_array_contains_in_insertion_order_with_limit() {
        let dir = tempdir().unwrap();
        let store = SqliteDocumentStore::open(&dir.path().join("cases.db")).unwrap();

        for id in ["c", "a", "b"] {
            store
                .set(id, fields(json!({"keywords": ["LINE", id]})))
                .await
                .unwrap();
        }
        // Replacing keeps the original position.
        store
            .set("c", fields(json!({"keywords": ["LINE"]})))
            .await
            .unwrap();

        let hits = store
            .query("keywords", QueryOp::ArrayContains, &json!("LINE"), 2)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        let scalar = store
            .query("keywords", QueryOp::Equals, &json!("LINE"), 10)
            .await
            .unwrap();
        assert!(scalar.is_empty());
    }

    #[test]
    fn test_open_fails_on_unusable_path() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, "x").unwrap();
        let result = SqliteDocumentStore::open(&file.join("cases.db"));
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }
}
