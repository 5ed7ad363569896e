pub mod fields;
pub mod line_items;
pub mod patterns;
pub mod rows;

use crate::config::HarvestConfig;
use crate::dom::Document;
use crate::models::Record;
use tracing::debug;

pub use self::fields::extract_record;
pub use self::line_items::{extract_line_items, summary_line_item};
pub use self::rows::locate_rows;

/// Locate rows and keep the records that carry an identifier.
pub fn extract_records(doc: &Document, page: u32, config: &HarvestConfig) -> Vec<Record> {
    let rows = locate_rows(doc);
    let found = rows.len();
    let records: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| extract_record(row, i + 1, page, config))
        .filter(Record::is_valid)
        .collect();
    debug!("{} of {} rows produced valid records", records.len(), found);
    records
}
