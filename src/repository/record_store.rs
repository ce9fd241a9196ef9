//! Idempotent record persistence and keyword lookup.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{DocumentStore, Fields, QueryOp, StoreConfig, StoreError, StoreResult};
use crate::models::Record;
use crate::pipeline::CancelToken;
use crate::scrapers::RetryPolicy;

/// Field holding a record's keyword array.
const KEYWORDS_FIELD: &str = "keywords";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Totals for a batch of upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    /// The batch stopped early on a cancellation request.
    pub cancelled: bool,
    pub errors: Vec<String>,
}

impl UpsertReport {
    pub fn stored(&self) -> usize {
        self.created + self.updated
    }

    /// Fold another batch's totals into this one.
    pub fn merge(&mut self, other: UpsertReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
        self.errors.extend(other.errors);
    }
}

/// Randomized pause between consecutive writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteThrottle {
    min: Duration,
    max: Duration,
}

impl WriteThrottle {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            Duration::from_millis(config.write_delay_min_ms),
            Duration::from_millis(config.write_delay_max_ms),
        )
    }

    /// No pause at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn next_delay(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Timeout(timeout.as_secs()))?
}

fn record_fields(record: &Record) -> StoreResult<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::write(
            record.identity().as_str(),
            format!("record serialized to {}", other),
        )),
    }
}

/// Owns the document store and keys every record by its content identity.
pub struct RecordStore<S> {
    store: S,
    retry: RetryPolicy,
    throttle: WriteThrottle,
    timeout: Duration,
}

impl<S: DocumentStore> RecordStore<S> {
    pub fn new(store: S, config: &StoreConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            throttle: WriteThrottle::from_config(config),
            timeout: config.timeout(),
        }
    }

    pub fn with_throttle(mut self, throttle: WriteThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert the record, or overwrite all of its fields if its identity exists.
    pub async fn upsert(&self, record: &Record) -> StoreResult<UpsertOutcome> {
        let identity = record.identity();
        let id = identity.as_str();
        let fields = record_fields(record)?;
        let store = &self.store;
        let timeout = self.timeout;
        let what = format!("store write {}", id);

        let existing = self
            .retry
            .run(&what, StoreError::is_retryable, move || {
                with_timeout(timeout, store.get(id))
            })
            .await?;

        match existing {
            None => {
                self.retry
                    .run(&what, StoreError::is_retryable, move || {
                        with_timeout(timeout, store.set(id, fields.clone()))
                    })
                    .await?;
                debug!("Created {}", id);
                Ok(UpsertOutcome::Created)
            }
            Some(_) => {
                self.retry
                    .run(&what, StoreError::is_retryable, move || {
                        with_timeout(timeout, store.update(id, fields.clone()))
                    })
                    .await?;
                debug!("Updated {}", id);
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Upsert records in order. Failures are per record; cancellation is
    /// only honoured between records.
    pub async fn upsert_all(&self, records: &[Record], cancel: &CancelToken) -> UpsertReport {
        let mut report = UpsertReport::default();

        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                self.throttle.pause().await;
            }
            if cancel.is_cancelled() {
                warn!(
                    "Cancelled after {} of {} records",
                    index,
                    records.len()
                );
                report.cancelled = true;
                break;
            }

            match self.upsert(record).await {
                Ok(UpsertOutcome::Created) => report.created += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(e) => {
                    warn!("Failed to store record {}: {}", record.identity(), e);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", record.identity(), e));
                }
            }
        }

        info!(
            "Stored {} new and {} updated records ({} failed)",
            report.created, report.updated, report.failed
        );
        report
    }

    /// Records tagged with any of `keywords`, de-duplicated by identity.
    ///
    /// Keywords are queried in the given order and results keep first-seen
    /// order, so the output is deterministic for a store with stable query
    /// ordering.
    pub async fn find_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> StoreResult<Vec<Record>> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        if limit == 0 {
            return Ok(results);
        }

        for keyword in keywords {
            let value = Value::String(keyword.clone());
            let docs = with_timeout(
                self.timeout,
                self.store
                    .query(KEYWORDS_FIELD, QueryOp::ArrayContains, &value, limit),
            )
            .await?;

            for doc in docs {
                if !seen.insert(doc.id.clone()) {
                    continue;
                }
                match serde_json::from_value::<Record>(Value::Object(doc.fields)) {
                    Ok(record) => results.push(record),
                    Err(e) => warn!("Skipping unreadable document {}: {}", doc.id, e),
                }
                if results.len() >= limit {
                    return Ok(results);
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryDocumentStore, StoredDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record_store() -> RecordStore<MemoryDocumentStore> {
        RecordStore::new(
            MemoryDocumentStore::new(),
            &StoreConfig::default(),
            RetryPolicy::none(),
        )
        .with_throttle(WriteThrottle::none())
    }

    fn case(date: &str, location: &str, content: &str, keywords: &[&str]) -> Record {
        let mut record = Record::new(date, location, "假投資", content);
        record.keywords = keywords.iter().map(|k| k.to_string()).collect();
        record
    }

    #[tokio::test]
    async fn test_created_then_updated_for_identical_record() {
        let store = record_store();
        let record = case("113-05-01", "臺北市", "被害人加入投資群組", &["投資"]);

        assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_all_is_idempotent() {
        let store = record_store();
        let cancel = CancelToken::new();
        let records = vec![
            case("113-05-01", "臺北市", "A", &["投資"]),
            case("113-05-02", "新北市", "B", &["LINE"]),
            case("113-05-02", "新北市", "C", &[]),
        ];

        let first = store.upsert_all(&records, &cancel).await;
        let after_first = store.store().snapshot().await;
        let second = store.upsert_all(&records, &cancel).await;
        let after_second = store.store().snapshot().await;

        assert_eq!((first.created, first.updated), (3, 0));
        assert_eq!((second.created, second.updated), (0, 3));
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_cancellation_between_records() {
        let store = record_store();
        let cancel = CancelToken::new();
        cancel.cancel();
        let records = vec![case("d", "l", "A", &[])];

        let report = store.upsert_all(&records, &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.stored(), 0);
        assert!(store.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_find_by_keywords_dedupes_and_limits() {
        let store = record_store();
        let cancel = CancelToken::new();
        let records = vec![
            case("1", "x", "投資和LINE", &["投資", "LINE"]),
            case("2", "x", "只有LINE", &["LINE"]),
            case("3", "x", "貸款", &["貸款"]),
            case("4", "x", "投資", &["投資"]),
        ];
        store.upsert_all(&records, &cancel).await;

        let keywords = vec!["投資".to_string(), "LINE".to_string()];
        let found = store.find_by_keywords(&keywords, 10).await.unwrap();
        let contents: Vec<&str> = found.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["投資和LINE", "投資", "只有LINE"]);

        let limited = store.find_by_keywords(&keywords, 2).await.unwrap();
        assert_eq!(limited.len(), 2);

        assert!(store
            .find_by_keywords(&["不存在".to_string()], 5)
            .await
            .unwrap()
            .is_empty());
    }

    /// Fails every write for one id; everything else goes to memory.
    struct FlakyStore {
        inner: MemoryDocumentStore,
        poisoned: String,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn get(&self, id: &str) -> StoreResult<Option<Fields>> {
            self.inner.get(id).await
        }

        async fn set(&self, id: &str, fields: Fields) -> StoreResult<()> {
            if id == self.poisoned {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                return Err(StoreError::write(id, "disk full"));
            }
            self.inner.set(id, fields).await
        }

        async fn update(&self, id: &str, fields: Fields) -> StoreResult<()> {
            self.inner.update(id, fields).await
        }

        async fn query(
            &self,
            field: &str,
            op: QueryOp,
            value: &Value,
            limit: usize,
        ) -> StoreResult<Vec<StoredDocument>> {
            self.inner.query(field, op, value, limit).await
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_per_record_and_retried() {
        let bad = case("2", "x", "bad", &[]);
        let flaky = FlakyStore {
            inner: MemoryDocumentStore::new(),
            poisoned: bad.identity().to_string(),
            attempts: AtomicUsize::new(0),
        };
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let store = RecordStore::new(flaky, &StoreConfig::default(), retry)
            .with_throttle(WriteThrottle::none());

        let records = vec![case("1", "x", "ok", &[]), bad, case("3", "x", "ok too", &[])];
        let report = store.upsert_all(&records, &CancelToken::new()).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(store.store().attempts.load(Ordering::SeqCst), 3);
    }

    /// Cancels the shared token once `after` documents have been written.
    struct CancellingStore {
        inner: MemoryDocumentStore,
        cancel: CancelToken,
        after: usize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CancellingStore {
        async fn get(&self, id: &str) -> StoreResult<Option<Fields>> {
            self.inner.get(id).await
        }

        async fn set(&self, id: &str, fields: Fields) -> StoreResult<()> {
            self.inner.set(id, fields).await?;
            if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.cancel.cancel();
            }
            Ok(())
        }

        async fn update(&self, id: &str, fields: Fields) -> StoreResult<()> {
            self.inner.update(id, fields).await
        }

        async fn query(
            &self,
            field: &str,
            op: QueryOp,
            value: &Value,
            limit: usize,
        ) -> StoreResult<Vec<StoredDocument>> {
            self.inner.query(field, op, value, limit).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_mid_batch_keeps_stored_prefix() {
        let cancel = CancelToken::new();
        let cancelling = CancellingStore {
            inner: MemoryDocumentStore::new(),
            cancel: cancel.clone(),
            after: 2,
            writes: AtomicUsize::new(0),
        };
        let store = RecordStore::new(cancelling, &StoreConfig::default(), RetryPolicy::none())
            .with_throttle(WriteThrottle::none());
        let records: Vec<Record> = (1..=5)
            .map(|i| case(&format!("113-05-0{}", i), "x", &format!("case {}", i), &[]))
            .collect();

        let report = store.upsert_all(&records, &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 0);
        let stored: Vec<String> = store
            .store()
            .inner
            .snapshot()
            .await
            .into_iter()
            .map(|d| d.id)
            .collect();
        let expected: Vec<String> = records[..2]
            .iter()
            .map(|r| r.identity().to_string())
            .collect();
        assert_eq!(stored, expected);
    }

    /// Lookups for one id never answer in time.
    struct SlowStore {
        inner: MemoryDocumentStore,
        stuck: String,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn get(&self, id: &str) -> StoreResult<Option<Fields>> {
            if id == self.stuck {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.inner.get(id).await
        }

        async fn set(&self, id: &str, fields: Fields) -> StoreResult<()> {
            self.inner.set(id, fields).await
        }

        async fn update(&self, id: &str, fields: Fields) -> StoreResult<()> {
            self.inner.update(id, fields).await
        }

        async fn query(
            &self,
            field: &str,
            op: QueryOp,
            value: &Value,
            limit: usize,
        ) -> StoreResult<Vec<StoredDocument>> {
            self.inner.query(field, op, value, limit).await
        }
    }

    #[tokio::test]
    async fn test_store_timeout_fails_one_record_and_batch_continues() {
        let stuck = case("2", "x", "stuck", &[]);
        let slow = SlowStore {
            inner: MemoryDocumentStore::new(),
            stuck: stuck.identity().to_string(),
        };
        let config = StoreConfig {
            timeout_secs: 1,
            ..StoreConfig::default()
        };
        let store = RecordStore::new(slow, &config, RetryPolicy::none())
            .with_throttle(WriteThrottle::none());

        let timed_out = store.upsert(&stuck).await;
        assert!(matches!(timed_out, Err(StoreError::Timeout(1))));

        let records = vec![case("1", "x", "ok", &[]), stuck, case("3", "x", "ok too", &[])];
        let report = store.upsert_all(&records, &CancelToken::new()).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("timed out"));
        assert_eq!(store.store().inner.len().await, 2);
    }

    #[test]
    fn test_throttle_delay_within_window() {
        let throttle = WriteThrottle::new(Duration::from_millis(500), Duration::from_millis(1500));
        for _ in 0..50 {
            let delay = throttle.next_delay();
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1500));
        }
        assert_eq!(WriteThrottle::none().next_delay(), Duration::ZERO);
    }
}
