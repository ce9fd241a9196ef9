//! Repository layer for record persistence.
//!
//! [`DocumentStore`] is a small key-value document interface (get, set,
//! update, indexed query). [`RecordStore`] sits on top of it and gives
//! records a content-addressed identity so that re-running an extraction
//! over unchanged pages never grows the collection.

mod memory;
mod record_store;
mod sqlite;

pub use memory::MemoryDocumentStore;
pub use record_store::{RecordStore, UpsertOutcome, UpsertReport, WriteThrottle};
pub use sqlite::SqliteDocumentStore;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A document body: top-level JSON fields.
pub type Fields = serde_json::Map<String, Value>;

/// Repository errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached at all. Fatal for a run.
    #[error("Cannot connect to store: {0}")]
    Connection(String),
    /// One document failed to write. Logged and skipped.
    #[error("Write failed for {id}: {message}")]
    Write { id: String, message: String },
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Store call timed out after {0}s")]
    Timeout(u64),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Write { .. } | StoreError::Timeout(_))
    }

    pub(crate) fn write(id: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Write {
            id: id.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Query comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Scalar field equals the value.
    Equals,
    /// Array field has the value as one of its elements.
    ArrayContains,
}

/// A document together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

/// Key-value document store.
///
/// Query results come back in insertion order for both built-in stores.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<Fields>>;
    /// Create or fully replace a document.
    async fn set(&self, id: &str, fields: Fields) -> StoreResult<()>;
    /// Overwrite the given fields of an existing document.
    async fn update(&self, id: &str, fields: Fields) -> StoreResult<()>;
    async fn query(
        &self,
        field: &str,
        op: QueryOp,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<StoredDocument>>;
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path, relative to the data directory.
    #[serde(default)]
    pub database: Option<String>,
    /// Randomized pause between writes, lower bound in milliseconds.
    #[serde(default = "default_write_delay_min_ms")]
    pub write_delay_min_ms: u64,
    #[serde(default = "default_write_delay_max_ms")]
    pub write_delay_max_ms: u64,
    /// Upper bound on any single store call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_write_delay_min_ms() -> u64 {
    500
}

fn default_write_delay_max_ms() -> u64 {
    1_500
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            write_delay_min_ms: default_write_delay_min_ms(),
            write_delay_max_ms: default_write_delay_max_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Open a SQLite connection with the settings every store call uses.
pub(crate) fn connect(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Extension trait to convert rusqlite errors for missing rows to Option.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
