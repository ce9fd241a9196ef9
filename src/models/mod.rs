//! Data models for casewatch.

mod outcome;
mod record;

pub use outcome::ExtractionOutcome;
pub use record::{Record, RecordId, UNKNOWN};
