//! Table strategy: one record per data row of every `<table>`.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::selectors::{compile, element_text};
use super::{ExtractionError, ExtractionStrategy};
use crate::models::{ExtractionOutcome, Record};

/// Maps table rows to records. The first row of each table is treated as a
/// header. Three cells map to date/title/content; four or more map to
/// date/location/method/summary.
pub struct TableStrategy {
    table: Selector,
    row: Selector,
    cell: Selector,
}

impl TableStrategy {
    pub fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            table: compile("table")?,
            row: compile("tr")?,
            cell: compile("td")?,
        })
    }

    fn row_record(&self, row: ElementRef<'_>) -> Result<Record, ExtractionError> {
        let cells: Vec<String> = row.select(&self.cell).map(element_text).collect();
        match cells.as_slice() {
            [date, title, content] => Ok(Record::without_location(date, title, content)),
            [date, location, method, summary, ..] => {
                Ok(Record::new(date, location, method, summary))
            }
            short => Err(ExtractionError::TooFewCells(short.len())),
        }
    }
}

impl ExtractionStrategy for TableStrategy {
    fn name(&self) -> &'static str {
        "table"
    }

    fn extract(&self, document: &Html) -> ExtractionOutcome {
        let mut records = Vec::new();

        for (index, table) in document.select(&self.table).enumerate() {
            let rows: Vec<ElementRef<'_>> = table.select(&self.row).collect();
            debug!("Table {} has {} rows", index, rows.len());

            for row in rows.into_iter().skip(1) {
                match self.row_record(row) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!("Skipping row in table {}: {}", index, e),
                }
            }
        }

        ExtractionOutcome::from_records(records)
    }
}
