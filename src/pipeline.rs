//! One extraction run: fetch each source, extract, tag, then persist.
//!
//! Sources are processed strictly in order and records are persisted in the
//! order the cascade produced them. A source that cannot be fetched is
//! reported and skipped; the run only fails when every source fails.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, Settings, SourceConfig};
use crate::extraction::ExtractionCascade;
use crate::models::Record;
use crate::repository::{
    DocumentStore, RecordStore, SqliteDocumentStore, StoreError, UpsertReport,
};
use crate::scrapers::{FetchMode, PageAcquirer, PaginationConfig};
use crate::services::KeywordTagger;
use crate::storage::ArtifactWriter;

/// Run-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("All {0} sources failed to load")]
    AllSourcesFailed(usize),
    #[error("Run cancelled after storing {stored} records")]
    Cancelled { stored: usize },
    #[error("Failed to write artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Extracted {
        strategy: Option<&'static str>,
        records: usize,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub url: String,
    pub status: SourceStatus,
}

/// What a run found and stored.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    /// Records in cascade order.
    pub records: Vec<Record>,
    pub upserts: UpsertReport,
    pub artifact: Option<PathBuf>,
}

impl RunReport {
    pub fn found(&self) -> usize {
        self.records.len()
    }

    pub fn created(&self) -> usize {
        self.upserts.created
    }

    pub fn updated(&self) -> usize {
        self.upserts.updated
    }

    pub fn failed(&self) -> usize {
        self.upserts.failed
    }

    pub fn failed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed(_)))
            .count()
    }
}

/// Open the SQLite-backed record store. This is the run's fatal connection point.
pub fn open_record_store(
    settings: &Settings,
    config: &Config,
) -> Result<RecordStore<SqliteDocumentStore>, PipelineError> {
    let store = SqliteDocumentStore::open(&settings.database_path)?;
    Ok(RecordStore::new(store, &config.store, config.retry.clone()))
}

pub struct Pipeline {
    sources: Vec<SourceConfig>,
    pagination: PaginationConfig,
    cascade: ExtractionCascade,
    tagger: KeywordTagger,
    artifacts: Option<ArtifactWriter>,
}

impl Pipeline {
    pub fn new(
        sources: Vec<SourceConfig>,
        pagination: PaginationConfig,
        cascade: ExtractionCascade,
        tagger: KeywordTagger,
    ) -> Self {
        Self {
            sources,
            pagination,
            cascade,
            tagger,
            artifacts: None,
        }
    }

    /// Build every stage from config; output goes to the data directory.
    pub fn from_config(config: &Config, settings: &Settings) -> Self {
        Self::new(
            config.sources.clone(),
            config.pagination.clone(),
            ExtractionCascade::from_config(&config.extraction),
            KeywordTagger::new(&config.keywords),
        )
        .with_artifacts(ArtifactWriter::new(
            &settings.data_dir,
            config.output.clone(),
        ))
    }

    pub fn with_artifacts(mut self, writer: ArtifactWriter) -> Self {
        self.artifacts = Some(writer);
        self
    }

    fn fetch_mode(&self, source: &SourceConfig) -> FetchMode {
        if !source.render {
            if source.paginate {
                warn!("Source '{}' sets paginate without render; fetching plain", source.name);
            }
            return FetchMode::Plain;
        }
        FetchMode::Rendered {
            paginate: source.paginate.then(|| self.pagination.clone()),
        }
    }

    /// Extract and tag records from already-fetched markup.
    pub fn process_markup(&self, markup: &str) -> (Option<&'static str>, Vec<Record>) {
        let result = self.cascade.extract(markup);
        let mut records = result.outcome.into_records();
        for record in &mut records {
            self.tagger.annotate(record);
        }
        (result.strategy, records)
    }

    /// Process sources one at a time: fetch, extract, tag, then persist
    /// before moving on. Records from finished sources stay stored when a
    /// later source fails or the run is cancelled.
    pub async fn run<A, S>(
        &self,
        acquirer: &mut A,
        store: &RecordStore<S>,
        cancel: &CancelToken,
    ) -> Result<RunReport, PipelineError>
    where
        A: PageAcquirer + ?Sized,
        S: DocumentStore,
    {
        let mut report = RunReport::default();

        for source in &self.sources {
            if cancel.is_cancelled() {
                break;
            }

            let markup = match acquirer.fetch(&source.url, &self.fetch_mode(source)).await {
                Ok(markup) => markup,
                Err(e) => {
                    warn!("Source '{}' failed: {}", source.name, e);
                    report.sources.push(SourceReport {
                        name: source.name.clone(),
                        url: source.url.clone(),
                        status: SourceStatus::Failed(e.to_string()),
                    });
                    continue;
                }
            };

            if let Some(writer) = self.artifacts.as_ref().filter(|w| w.config().snapshots) {
                if let Err(e) = writer.save_snapshot(&source.name, &markup) {
                    warn!("Could not save snapshot for '{}': {}", source.name, e);
                }
            }

            let (strategy, records) = self.process_markup(&markup);
            info!(
                "Source '{}': {} records via {}",
                source.name,
                records.len(),
                strategy.unwrap_or("no strategy")
            );
            report.sources.push(SourceReport {
                name: source.name.clone(),
                url: source.url.clone(),
                status: SourceStatus::Extracted {
                    strategy,
                    records: records.len(),
                },
            });

            let upserts = store.upsert_all(&records, cancel).await;
            report.upserts.merge(upserts);
            report.records.extend(records);
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stored: report.upserts.stored(),
            });
        }

        if !self.sources.is_empty() && report.failed_sources() == self.sources.len() {
            return Err(PipelineError::AllSourcesFailed(self.sources.len()));
        }

        if let Some(writer) = self.artifacts.as_ref().filter(|w| w.config().flat_file) {
            report.artifact = Some(writer.write_records(&report.records)?);
        }

        info!(
            "Run complete: {} found, {} new, {} updated, {} failed",
            report.found(),
            report.created(),
            report.updated(),
            report.failed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_fetch_mode_follows_source_flags() {
        let pipeline = Pipeline::new(
            Vec::new(),
            PaginationConfig::default(),
            ExtractionCascade::default(),
            KeywordTagger::new(&Default::default()),
        );
        let mut source = SourceConfig::new("s", "https://example.org");
        assert_eq!(pipeline.fetch_mode(&source), FetchMode::Plain);

        source.paginate = true;
        assert_eq!(pipeline.fetch_mode(&source), FetchMode::Plain);

        source.render = true;
        assert_eq!(
            pipeline.fetch_mode(&source),
            FetchMode::Rendered {
                paginate: Some(PaginationConfig::default())
            }
        );

        source.paginate = false;
        assert_eq!(
            pipeline.fetch_mode(&source),
            FetchMode::Rendered { paginate: None }
        );
    }

    #[test]
    fn test_process_markup_tags_records() {
        let pipeline = Pipeline::new(
            Vec::new(),
            PaginationConfig::default(),
            ExtractionCascade::default(),
            KeywordTagger::new(&Default::default()),
        );
        let (strategy, records) = pipeline.process_markup(
            "<table><tr><th>日期</th><th>標題</th><th>內容</th></tr>\
             <tr><td>113-01-01</td><td>假投資</td><td>加入LINE投資群組</td></tr></table>",
        );
        assert_eq!(strategy, Some("table"));
        assert!(records[0].keywords.contains("投資"));
        assert!(records[0].keywords.contains("LINE"));
    }
}
