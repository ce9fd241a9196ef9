//! Run command: one pass over every configured source.

use anyhow::Context;
use console::style;
use tracing::{error, warn};

use crate::config::{Config, Settings};
use crate::pipeline::{open_record_store, CancelToken, Pipeline, RunReport, SourceStatus};
use crate::repository::{DocumentStore, MemoryDocumentStore, RecordStore, WriteThrottle};
use crate::scrapers::{PageAcquirer, WebAcquirer};
use crate::storage::append_error_log;

const PREVIEW_RECORDS: usize = 5;
const PREVIEW_CHARS: usize = 100;

pub async fn cmd_run(settings: &Settings, config: &Config, dry_run: bool) -> anyhow::Result<()> {
    let result = execute(settings, config, dry_run).await;

    if let Err(ref e) = result {
        error!("Run failed: {:#}", e);
        if let Err(log_err) = append_error_log(&settings.error_log_path(), &format!("{:#}", e)) {
            warn!("Could not write error log: {}", log_err);
        }
    }
    result
}

async fn execute(settings: &Settings, config: &Config, dry_run: bool) -> anyhow::Result<()> {
    settings
        .ensure_directories()
        .with_context(|| format!("creating {}", settings.data_dir.display()))?;

    if config.sources.is_empty() {
        println!("{} No sources configured", style("!").yellow());
    }

    let pipeline = Pipeline::from_config(config, settings);
    let mut acquirer = WebAcquirer::new(config.browser.clone(), config.retry.clone())
        .context("building HTTP client")?;

    let cancel = CancelToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing current step");
                cancel.cancel();
            }
        })
    };

    let result = if dry_run {
        println!("{} Dry run: records are not persisted", style("!").yellow());
        let store = RecordStore::new(MemoryDocumentStore::new(), &config.store, config.retry.clone())
            .with_throttle(WriteThrottle::none());
        drive(&pipeline, &mut acquirer, &store, &cancel).await
    } else {
        match open_record_store(settings, config) {
            Ok(store) => drive(&pipeline, &mut acquirer, &store, &cancel).await,
            Err(e) => Err(e.into()),
        }
    };

    acquirer.close().await;
    ctrl_c.abort();

    let report = result?;
    print_report(&report);
    Ok(())
}

async fn drive<S: DocumentStore>(
    pipeline: &Pipeline,
    acquirer: &mut WebAcquirer,
    store: &RecordStore<S>,
    cancel: &CancelToken,
) -> anyhow::Result<RunReport> {
    Ok(pipeline.run(acquirer, store, cancel).await?)
}

fn print_report(report: &RunReport) {
    for source in &report.sources {
        match &source.status {
            SourceStatus::Extracted { strategy, records } => println!(
                "  {} {}: {} records ({})",
                style("✓").green(),
                source.name,
                records,
                strategy.unwrap_or("nothing matched")
            ),
            SourceStatus::Failed(reason) => println!(
                "  {} {}: {}",
                style("✗").red(),
                source.name,
                reason
            ),
        }
    }

    println!(
        "\n{} {} found, {} new, {} updated",
        style("✓").green(),
        report.found(),
        report.created(),
        report.updated()
    );
    if report.failed() > 0 {
        println!(
            "{} {} records could not be stored",
            style("!").yellow(),
            report.failed()
        );
    }
    if let Some(ref path) = report.artifact {
        println!("  Artifact: {}", path.display());
    }

    if report.records.is_empty() {
        return;
    }

    println!();
    for (i, record) in report.records.iter().take(PREVIEW_RECORDS).enumerate() {
        println!(
            "{}. [{}] {} {}",
            i + 1,
            record.date,
            record.location,
            style(&record.title).bold()
        );
        println!("   {}", record.content_preview(PREVIEW_CHARS));
        if !record.keywords.is_empty() {
            let keywords: Vec<&str> = record.keywords.iter().map(String::as_str).collect();
            println!("   {}", style(keywords.join(", ")).dim());
        }
    }
    if report.records.len() > PREVIEW_RECORDS {
        println!("... {} more", report.records.len() - PREVIEW_RECORDS);
    }
}
