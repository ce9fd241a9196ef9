//! Selector lists and patterns for the extraction cascade.

use serde::{Deserialize, Serialize};

/// Tunables for every extraction strategy. Selector lists are in priority
/// order; for per-field lookups the first selector with non-empty text wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Containers that are known to hold one case each.
    pub known_containers: Vec<String>,
    /// Broader card/row containers tried when no known container matched.
    pub generic_containers: Vec<String>,
    pub date_selectors: Vec<String>,
    /// Text markers that make any `<span>` a date candidate (e.g. "發布").
    pub date_markers: Vec<String>,
    pub title_selectors: Vec<String>,
    pub content_selectors: Vec<String>,
    /// Regex for date-shaped text used by the text-pattern fallback.
    pub date_pattern: String,
    /// How many levels above a date text's parent to search for its block.
    pub ancestor_levels: usize,
    /// Elements harvested for title and content inside that block.
    pub fragment_selector: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            known_containers: strings(&["div.case-item", "div.record-item", "div.data-row"]),
            generic_containers: strings(&["div.row", "div.card", "div.item", "div.list-item"]),
            date_selectors: strings(&[".date", "[class*=\"date\"]", "[class*=\"time\"]"]),
            date_markers: strings(&["發布"]),
            title_selectors: strings(&[
                "h1",
                "h2",
                "h3",
                "h4",
                ".title",
                "[class*=\"title\"]",
                ".heading",
                "[class*=\"heading\"]",
            ]),
            content_selectors: strings(&[
                "p",
                ".content",
                "[class*=\"content\"]",
                ".desc",
                "[class*=\"desc\"]",
                ".body",
                "[class*=\"body\"]",
            ]),
            // ROC-era years 100-119 followed by a month, e.g. "113-05" or "114-1".
            date_pattern: r"1[01]\d-\d{1,2}".to_string(),
            ancestor_levels: 3,
            fragment_selector: "h1, h2, h3, h4, p, div".to_string(),
        }
    }
}
