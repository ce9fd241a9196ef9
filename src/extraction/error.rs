//! Extraction error types.
//!
//! These never escape a strategy: a failing element is logged and skipped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("Malformed element: {0}")]
    MalformedElement(String),
    #[error("Row has {0} cells, need at least 3")]
    TooFewCells(usize),
}
