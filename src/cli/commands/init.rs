//! Initialize command.

use anyhow::Context;
use console::style;

use crate::config::{Config, Settings, CONFIG_FILENAME};
use crate::repository::SqliteDocumentStore;

const CONFIG_HEADER: &str = "\
# casewatch configuration.
#
# Each [[sources]] entry is fetched once per run. Set render = true to load
# the page in a headless browser and paginate = true to scroll it until no
# new rows appear. Selector lists under [extraction] are tried in order.
";

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    settings
        .ensure_directories()
        .with_context(|| format!("creating {}", settings.data_dir.display()))?;

    let store = SqliteDocumentStore::open(&settings.database_path)
        .with_context(|| format!("opening {}", settings.database_path.display()))?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        store.database_path().display()
    );

    let config_path = settings.data_dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        println!(
            "  {} Keeping existing {}",
            style("!").yellow(),
            config_path.display()
        );
    } else {
        let body = config.to_toml().context("serializing default config")?;
        std::fs::write(&config_path, format!("{}\n{}", CONFIG_HEADER, body))
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!(
            "  {} Wrote {}",
            style("✓").green(),
            config_path.display()
        );
    }

    println!(
        "{} Initialized casewatch in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
