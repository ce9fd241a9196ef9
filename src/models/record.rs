//! Fraud-case record model.
//!
//! Records carry no natural key from the source page. Their identity is
//! content-addressed: date, location and a SHA-256 prefix of the content,
//! so re-extracting an unchanged page yields the same identity.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel stored for any field the source page did not provide.
pub const UNKNOWN: &str = "unknown";

/// Number of hex characters of the identity hash kept in the identity.
const IDENTITY_HASH_LEN: usize = 16;

/// A single extracted fraud-case summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Free-form date text as published (formats vary by source).
    #[serde(default = "unknown")]
    pub date: String,
    /// Location, when the source page carries one.
    #[serde(default = "unknown")]
    pub location: String,
    /// Title or fraud method.
    #[serde(default = "unknown", alias = "method")]
    pub title: String,
    /// Primary free text (case summary).
    #[serde(default = "unknown", alias = "summary")]
    pub content: String,
    /// Matched terms from the controlled vocabulary.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// When this record was extracted.
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// Normalize extracted text: trim, and map empty text to the sentinel.
pub(crate) fn normalize_field(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        unknown()
    } else {
        trimmed.to_string()
    }
}

impl Record {
    /// Create a record from raw field text, normalizing every field.
    pub fn new(date: &str, location: &str, title: &str, content: &str) -> Self {
        Self {
            date: normalize_field(date),
            location: normalize_field(location),
            title: normalize_field(title),
            content: normalize_field(content),
            keywords: BTreeSet::new(),
            captured_at: Utc::now(),
        }
    }

    /// Create a record from a source that has no location column.
    pub fn without_location(date: &str, title: &str, content: &str) -> Self {
        Self::new(date, UNKNOWN, title, content)
    }

    /// True when date, title and content are all the sentinel.
    pub fn is_blank(&self) -> bool {
        self.date == UNKNOWN && self.title == UNKNOWN && self.content == UNKNOWN
    }

    /// SHA-256 hex digest over date, location and content.
    ///
    /// Each field is length-prefixed so no two distinct field tuples share
    /// an input.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [&self.date, &self.location, &self.content] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Content-addressed identity of this record. The date and location
    /// prefix is for readability; the hash alone distinguishes records.
    pub fn identity(&self) -> RecordId {
        let hash = self.identity_hash();
        RecordId(format!(
            "{}_{}_{}",
            self.date,
            self.location,
            &hash[..IDENTITY_HASH_LEN]
        ))
    }

    /// Content truncated to `max_chars` characters, for previews.
    pub fn content_preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() > max_chars {
            let head: String = self.content.chars().take(max_chars).collect();
            format!("{}...", head)
        } else {
            self.content.clone()
        }
    }
}

/// Stable document identity derived from a record's own content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
