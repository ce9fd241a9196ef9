//! Selector compilation and text helpers shared by the strategies.

use scraper::{ElementRef, Selector};
use tracing::warn;

use super::ExtractionError;

pub(crate) fn compile(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Compile a priority list, skipping (and logging) selectors that do not parse.
pub(crate) fn compile_all(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| match compile(s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}

/// All descendant text of an element, trimmed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first element under `scope` with non-empty text, trying
/// selectors in priority order.
pub(crate) fn first_text(scope: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        scope
            .select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_invalid_selectors_are_skipped() {
        let compiled = compile_all(&["div.ok".to_string(), "div[".to_string()]);
        assert_eq!(compiled.len(), 1);
        assert!(matches!(
            compile("::nope("),
            Err(ExtractionError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_first_text_respects_priority_not_document_order() {
        let doc = Html::parse_fragment(
            r#"<div id="c"><p>body first</p><h3>heading second</h3></div>"#,
        );
        let scope = doc.root_element();
        let selectors = compile_all(&["h3".to_string(), "p".to_string()]);
        assert_eq!(first_text(scope, &selectors).as_deref(), Some("heading second"));
    }

    #[test]
    fn test_first_text_skips_empty_matches() {
        let doc = Html::parse_fragment(r#"<div><h3>  </h3><h3>Real</h3></div>"#);
        let selectors = compile_all(&["h3".to_string()]);
        assert_eq!(first_text(doc.root_element(), &selectors).as_deref(), Some("Real"));
    }
}
