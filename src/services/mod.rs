//! Domain services that sit between extraction and storage.

pub mod keywords;

pub use keywords::{tag, KeywordConfig, KeywordTagger};
