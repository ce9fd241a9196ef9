//! Offline extraction from a saved page.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::extraction::ExtractionCascade;
use crate::pipeline::Pipeline;
use crate::services::KeywordTagger;

pub async fn cmd_extract(config: &Config, file: &Path) -> anyhow::Result<()> {
    let markup = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    // No sources and no artifact writer: extraction and tagging only.
    let pipeline = Pipeline::new(
        Vec::new(),
        config.pagination.clone(),
        ExtractionCascade::from_config(&config.extraction),
        KeywordTagger::new(&config.keywords),
    );
    let (strategy, records) = pipeline.process_markup(&markup);
    info!(
        "{}: {} records via {}",
        file.display(),
        records.len(),
        strategy.unwrap_or("no strategy")
    );

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
