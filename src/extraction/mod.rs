//! Adaptive record extraction.
//!
//! An [`ExtractionCascade`] holds an ordered list of strategies, most precise
//! first. The first strategy that yields at least one record wins and later
//! strategies are never run. Failures inside a strategy are per-element: the
//! element is skipped and the rest of the page still extracts.

mod config;
mod containers;
mod error;
mod selectors;
mod table;
mod text_pattern;

pub use config::ExtractionConfig;
pub use containers::ContainerStrategy;
pub use error::ExtractionError;
pub use table::TableStrategy;
pub use text_pattern::TextPatternStrategy;

use scraper::Html;
use tracing::{debug, info, warn};

use crate::models::ExtractionOutcome;

/// One way of turning a parsed page into records.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, document: &Html) -> ExtractionOutcome;
}

/// Which strategy produced the outcome, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeResult {
    pub strategy: Option<&'static str>,
    pub outcome: ExtractionOutcome,
}

pub struct ExtractionCascade {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionCascade {
    /// Table, known containers, generic cards, then text patterns.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let built: Vec<Result<Box<dyn ExtractionStrategy>, ExtractionError>> = vec![
            TableStrategy::new().map(|s| Box::new(s) as Box<dyn ExtractionStrategy>),
            ContainerStrategy::known(config).map(|s| Box::new(s) as Box<dyn ExtractionStrategy>),
            ContainerStrategy::generic(config).map(|s| Box::new(s) as Box<dyn ExtractionStrategy>),
            TextPatternStrategy::new(config).map(|s| Box::new(s) as Box<dyn ExtractionStrategy>),
        ];

        let strategies = built
            .into_iter()
            .filter_map(|strategy| match strategy {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    warn!("Extraction strategy disabled: {}", e);
                    None
                }
            })
            .collect();

        Self { strategies }
    }

    /// Use a custom strategy list, tried in the given order.
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Parse `markup` and run strategies until one finds records.
    pub fn extract(&self, markup: &str) -> CascadeResult {
        let document = Html::parse_document(markup);

        for strategy in &self.strategies {
            let outcome = strategy.extract(&document);
            if outcome.is_empty() {
                debug!("Strategy '{}' found nothing", strategy.name());
                continue;
            }
            info!(
                "Strategy '{}' extracted {} records",
                strategy.name(),
                outcome.len()
            );
            return CascadeResult {
                strategy: Some(strategy.name()),
                outcome,
            };
        }

        info!("No strategy found any records");
        CascadeResult {
            strategy: None,
            outcome: ExtractionOutcome::Empty,
        }
    }
}

impl Default for ExtractionCascade {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}
