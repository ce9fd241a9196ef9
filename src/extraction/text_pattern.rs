//! Last-resort strategy: find date-shaped text anywhere and harvest the
//! nearest enclosing block for a title and content.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::selectors::{compile, element_text};
use super::{ExtractionConfig, ExtractionError, ExtractionStrategy};
use crate::models::{ExtractionOutcome, Record, UNKNOWN};

pub struct TextPatternStrategy {
    date_pattern: Option<Regex>,
    ancestor_levels: usize,
    fragments: Selector,
}

impl TextPatternStrategy {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let date_pattern = match Regex::new(&config.date_pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid date pattern '{}': {}", config.date_pattern, e);
                None
            }
        };
        Ok(Self {
            date_pattern,
            ancestor_levels: config.ancestor_levels,
            fragments: compile(&config.fragment_selector)?,
        })
    }

    fn block_record(&self, parent: ElementRef<'_>, date: &str) -> Result<Record, ExtractionError> {
        let mut block = parent;
        for _ in 0..self.ancestor_levels {
            match block.parent().and_then(ElementRef::wrap) {
                Some(up) => block = up,
                None => break,
            }
        }

        let mut texts = block
            .select(&self.fragments)
            .map(element_text)
            .filter(|text| !text.is_empty() && text != date);
        let title = texts.next();
        let content = texts.find(|text| Some(text) != title.as_ref());

        if title.is_none() {
            return Err(ExtractionError::MalformedElement(format!(
                "no text near date '{}'",
                date
            )));
        }

        Ok(Record::without_location(
            date,
            title.as_deref().unwrap_or(UNKNOWN),
            content.as_deref().unwrap_or(UNKNOWN),
        ))
    }
}

impl ExtractionStrategy for TextPatternStrategy {
    fn name(&self) -> &'static str {
        "text-pattern"
    }

    fn extract(&self, document: &Html) -> ExtractionOutcome {
        let Some(pattern) = &self.date_pattern else {
            return ExtractionOutcome::Empty;
        };

        let mut records = Vec::new();
        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !pattern.is_match(text) {
                continue;
            }
            let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            if matches!(parent.value().name(), "script" | "style") {
                continue;
            }

            let date = text.trim();
            match self.block_record(parent, date) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping date text: {}", e),
            }
        }

        ExtractionOutcome::from_records(records)
    }
}
