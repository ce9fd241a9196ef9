//! Result of running an extraction strategy over a page.

use super::Record;

/// Either some records or nothing. Absence is data, not failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Found(Vec<Record>),
    Empty,
}

impl ExtractionOutcome {
    /// Wrap a record list, mapping an empty list to `Empty`.
    pub fn from_records(records: Vec<Record>) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Found(records)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Found(records) => records.len(),
            Self::Empty => 0,
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            Self::Found(records) => records,
            Self::Empty => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Found(records) => records,
            Self::Empty => Vec::new(),
        }
    }
}
