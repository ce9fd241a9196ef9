//! Configuration management for casewatch.
//!
//! A TOML file describes the pages to watch and tunes every stage of the
//! pipeline. Each component receives its own section at construction time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extraction::ExtractionConfig;
use crate::repository::StoreConfig;
use crate::scrapers::{BrowserEngineConfig, PaginationConfig, RetryPolicy};
use crate::services::KeywordConfig;
use crate::storage::OutputConfig;

/// Default config filename.
pub const CONFIG_FILENAME: &str = "casewatch.toml";

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "casewatch.db";

/// Page holding the city-level fraud case summaries.
pub const DEFAULT_SOURCE_URL: &str = "https://165dashboard.tw/city-case-summary";

/// A page to extract records from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short name used in logs, reports and snapshot filenames.
    pub name: String,
    /// Page URL.
    pub url: String,
    /// Render the page in a browser before extracting.
    #[serde(default)]
    pub render: bool,
    /// Drive infinite scroll before extracting (requires `render`).
    #[serde(default)]
    pub paginate: bool,
}

impl SourceConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            render: false,
            paginate: false,
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig {
        name: "165-city-case-summary".to_string(),
        url: DEFAULT_SOURCE_URL.to_string(),
        render: true,
        paginate: true,
    }]
}

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Pages to extract from, processed in order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            sources: default_sources(),
            pagination: PaginationConfig::default(),
            extraction: ExtractionConfig::default(),
            keywords: KeywordConfig::default(),
            store: StoreConfig::default(),
            retry: RetryPolicy::default(),
            output: OutputConfig::default(),
            browser: BrowserEngineConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load config from a specific file.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Render this config as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Directory containing the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
    }

    /// Resolve a path relative to the config file location.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// Application settings resolved from config, CLI and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// SQLite database path.
    pub database_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("casewatch");

        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            data_dir,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            data_dir,
        }
    }

    /// Path of the diagnostic log written when a run fails.
    pub fn error_log_path(&self) -> PathBuf {
        self.data_dir.join("crawler_error.log")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;
        if let Some(parent) = self.database_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Options controlling where settings come from.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (--config).
    pub config_path: Option<PathBuf>,
    /// Explicit data directory (--data).
    pub data: Option<PathBuf>,
}

/// Environment overrides, read once.
struct EnvOverrides {
    data_dir: Option<PathBuf>,
    database: Option<PathBuf>,
    browser_url: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|s| !s.is_empty());
        Self {
            data_dir: var("CASEWATCH_DATA_DIR").map(PathBuf::from),
            database: var("CASEWATCH_DATABASE").map(PathBuf::from),
            browser_url: var("CASEWATCH_BROWSER_URL"),
        }
    }
}

/// Find a config file: explicit path, then the working directory, then the data dir.
fn discover_config(options: &LoadOptions, data_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(ref path) = options.config_path {
        return Some(path.clone());
    }

    let cwd_config = PathBuf::from(CONFIG_FILENAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    data_dir
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub fn load_settings_with_options(options: LoadOptions) -> anyhow::Result<(Settings, Config)> {
    let env = EnvOverrides::from_env();

    let data_dir_override = options.data.clone().or(env.data_dir);

    let mut config = match discover_config(&options, data_dir_override.as_deref()) {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Config::load_from_path(&path)?
        }
        None => Config::default(),
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = match (&data_dir_override, &config.data_dir) {
        (Some(dir), _) => Settings::with_data_dir(dir.clone()),
        (None, Some(dir)) => Settings::with_data_dir(config.resolve_path(dir, &base_dir)),
        (None, None) => Settings::default(),
    };

    if let Some(ref database) = config.store.database {
        settings.database_path = config.resolve_path(database, &settings.data_dir);
    }

    // CASEWATCH_DATABASE takes highest precedence
    if let Some(database) = env.database {
        tracing::debug!("Using CASEWATCH_DATABASE from environment: {}", database.display());
        settings.database_path = database;
    }

    if let Some(url) = env.browser_url {
        tracing::debug!("Using CASEWATCH_BROWSER_URL from environment: {}", url);
        config.browser.remote_url = Some(url);
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_watches_case_summary_page() {
        let config = Config::default();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].url, DEFAULT_SOURCE_URL);
        assert!(config.sources[0].render);
        assert_eq!(config.pagination.target_records, 200);
        assert_eq!(config.pagination.max_steps, 20);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            data_dir = "data"

            [[sources]]
            name = "static"
            url = "https://example.org/cases"

            [pagination]
            target_records = 50

            [store]
            write_delay_min_ms = 0
            write_delay_max_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir.as_deref(), Some("data"));
        assert_eq!(config.sources.len(), 1);
        assert!(!config.sources[0].render);
        assert_eq!(config.pagination.target_records, 50);
        assert_eq!(config.pagination.max_steps, 20);
        assert_eq!(config.store.write_delay_max_ms, 0);
        assert!(!config.keywords.vocabulary.is_empty());
        assert_eq!(config.sources[0].name, "static");
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = Config::default().to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.sources, Config::default().sources);
        assert_eq!(
            parsed.extraction.known_containers,
            ExtractionConfig::default().known_containers
        );
    }

    #[test]
    fn test_explicit_config_and_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        fs::write(
            &config_path,
            "[store]\ndatabase = \"cases.sqlite\"\n",
        )
        .unwrap();

        let data = dir.path().join("data");
        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: Some(config_path.clone()),
            data: Some(data.clone()),
        })
        .unwrap();

        assert_eq!(config.source_path.as_deref(), Some(config_path.as_path()));
        assert_eq!(settings.data_dir, data);
        assert_eq!(settings.database_path, data.join("cases.sqlite"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings_with_options(LoadOptions {
            config_path: Some(dir.path().join("nope.toml")),
            data: Some(dir.path().to_path_buf()),
        });
        assert!(result.is_err());
    }
}
