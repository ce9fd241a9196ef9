//! Container strategies: card/list items with date, heading and body
//! sub-elements.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::selectors::{compile, compile_all, element_text, first_text};
use super::{ExtractionConfig, ExtractionError, ExtractionStrategy};
use crate::models::{ExtractionOutcome, Record, UNKNOWN};

/// Field lookups shared by the known-class and generic container strategies.
struct FieldSelectors {
    date: Vec<Selector>,
    date_markers: Vec<String>,
    span: Selector,
    title: Vec<Selector>,
    content: Vec<Selector>,
}

impl FieldSelectors {
    fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        Ok(Self {
            date: compile_all(&config.date_selectors),
            date_markers: config.date_markers.clone(),
            span: compile("span")?,
            title: compile_all(&config.title_selectors),
            content: compile_all(&config.content_selectors),
        })
    }

    fn date(&self, container: ElementRef<'_>) -> Option<String> {
        first_text(container, &self.date).or_else(|| {
            container
                .select(&self.span)
                .map(element_text)
                .find(|text| self.date_markers.iter().any(|m| text.contains(m.as_str())))
        })
    }
}

/// Extracts one record per matching container element.
pub struct ContainerStrategy {
    name: &'static str,
    containers: Vec<Selector>,
    fields: FieldSelectors,
}

impl ContainerStrategy {
    /// Containers from the known, source-specific class list.
    pub fn known(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        Self::with_containers("known-containers", &config.known_containers, config)
    }

    /// Broader generic card/row containers.
    pub fn generic(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        Self::with_containers("generic-cards", &config.generic_containers, config)
    }

    fn with_containers(
        name: &'static str,
        containers: &[String],
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractionError> {
        Ok(Self {
            name,
            containers: compile_all(containers),
            fields: FieldSelectors::from_config(config)?,
        })
    }

    fn container_record(&self, container: ElementRef<'_>) -> Result<Record, ExtractionError> {
        let date = self.fields.date(container);
        let title = first_text(container, &self.fields.title);
        let content = first_text(container, &self.fields.content);

        if date.is_none() && title.is_none() && content.is_none() {
            return Err(ExtractionError::MalformedElement(format!(
                "<{}> has no date, title or content",
                container.value().name()
            )));
        }

        Ok(Record::without_location(
            date.as_deref().unwrap_or(UNKNOWN),
            title.as_deref().unwrap_or(UNKNOWN),
            content.as_deref().unwrap_or(UNKNOWN),
        ))
    }
}

impl ExtractionStrategy for ContainerStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, document: &Html) -> ExtractionOutcome {
        if self.containers.is_empty() {
            return ExtractionOutcome::Empty;
        }

        // Walk in document order so a node matching several selectors is visited once.
        let matches: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| self.containers.iter().any(|s| s.matches(el)))
            .collect();
        debug!("{}: {} candidate containers", self.name, matches.len());

        let records = matches
            .into_iter()
            .filter_map(|container| match self.container_record(container) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("{}: skipping container: {}", self.name, e);
                    None
                }
            })
            .collect();

        ExtractionOutcome::from_records(records)
    }
}
