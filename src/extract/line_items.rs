use crate::dom::{Document, first_within, query_any_within, text_of};
use crate::models::{LineItem, Record};
use scraper::ElementRef;
use tracing::debug;

const DETAIL_TABLES: &[&str] = &[".ms-DetailsList", r#"[data-automationid="DetailsList"]"#, "table"];
const HEADER_DESCRIPTIONS: &[&str] = &["اسم الصنف", "Description"];

/// Read the line items of an open invoice detail view.
///
/// The first detail table that yields items wins. Listing rows (cells keyed by `uuid`)
/// are not line items and are skipped.
pub fn extract_line_items(doc: &Document) -> Vec<LineItem> {
    for selector in DETAIL_TABLES {
        let Ok(tables) = doc.query(selector) else { continue };
        for table in tables {
            let items = items_from_table(table);
            if !items.is_empty() {
                debug!("{} line items from {}", items.len(), selector);
                return items;
            }
        }
    }
    Vec::new()
}

fn items_from_table(table: ElementRef<'_>) -> Vec<LineItem> {
    query_any_within(table, &[r#".ms-DetailsRow[role="row"]"#, "tr"])
        .into_iter()
        .filter(|row| first_within(*row, r#"[data-automation-key="uuid"]"#).is_none())
        .enumerate()
        .filter_map(|(i, row)| item_from_row(row, i + 1))
        .collect()
}

fn item_from_row(row: ElementRef<'_>, n: usize) -> Option<LineItem> {
    let cells = query_any_within(row, &[".ms-DetailsRow-cell", "td"]);
    if cells.len() < 6 {
        return None;
    }
    let cell = |i: usize, default: &str| {
        cells
            .get(i)
            .map(|c| cell_text(*c))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    let description = cells.get(1).map(|c| cell_text(*c)).unwrap_or_default();
    if description.is_empty() || HEADER_DESCRIPTIONS.contains(&description.as_str()) {
        return None;
    }

    Some(LineItem {
        item_code: cell(0, &format!("ITEM-{}", n)),
        description,
        unit_code: cell(2, "EA"),
        unit_name: cell(3, "قطعة"),
        quantity: cell(4, "1"),
        unit_price: cell(5, "0"),
        total_value: cell(6, "0"),
        tax_amount: cell(7, "0"),
        vat_amount: cell(8, "0"),
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    first_within(cell, ".griCellTitle, .griCellTitleGray, .ms-DetailsRow-cellContent")
        .map(text_of)
        .unwrap_or_else(|| text_of(cell))
}

/// One line item standing for the whole invoice, from the record's own totals.
pub fn summary_line_item(record: &Record) -> LineItem {
    let or = |value: &str, default: &str| {
        if value.is_empty() { default.to_string() } else { value.to_string() }
    };
    LineItem {
        item_code: or(&record.electronic_number, "INVOICE"),
        description: "إجمالي الفاتورة".to_string(),
        unit_code: "EA".to_string(),
        unit_name: "فاتورة".to_string(),
        quantity: "1".to_string(),
        unit_price: or(&record.total_amount, "0"),
        total_value: or(&record.invoice_value, &or(&record.total_amount, "0")),
        tax_amount: "0".to_string(),
        vat_amount: or(&record.vat_amount, "0"),
    }
}
