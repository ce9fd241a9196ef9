//! Search command.

use console::style;

use crate::config::{Config, Settings};
use crate::pipeline::open_record_store;

pub async fn cmd_search(
    settings: &Settings,
    config: &Config,
    keywords: &[String],
    limit: usize,
) -> anyhow::Result<()> {
    let store = open_record_store(settings, config)?;
    let records = store.find_by_keywords(keywords, limit).await?;

    if records.is_empty() {
        println!(
            "{} No records tagged with {}",
            style("!").yellow(),
            keywords.join(", ")
        );
        return Ok(());
    }

    for record in &records {
        println!(
            "[{}] {} {}",
            record.date,
            record.location,
            style(&record.title).bold()
        );
        println!("  {}", record.content);
    }
    println!("\n{} {} records", style("✓").green(), records.len());

    Ok(())
}
