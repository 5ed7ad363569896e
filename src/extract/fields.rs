//! Row → [`Record`] extraction.
//!
//! Three passes run in order over the same row. A pass only writes fields that are
//! still empty, so the earliest pass that finds a value keeps it:
//!
//! 1. cells keyed by `data-automation-key` (most reliable),
//! 2. cell positions, for grids without keys,
//! 3. regexes over the whole row text.

use super::patterns::{
    CURRENCY_AMOUNT, DMY_DATE, ELECTRONIC_NUMBER, detect_currency, format_amount,
    looks_like_amount_cell, parse_amount, parse_date, split_vat,
};
use crate::config::HarvestConfig;
use crate::dom::{first_within, query_any_within, text_of};
use crate::models::{Record, UNSPECIFIED_ADDRESS};
use scraper::ElementRef;

type Pass = fn(ElementRef<'_>, &mut Record);

const PASSES: &[(&str, Pass)] = &[
    ("attribute", attribute_pass),
    ("positional", positional_pass),
    ("free-text", free_text_pass),
];

const TITLE: &str = ".griCellTitleGray, .griCellTitle";
const SUBTITLE: &str = ".griCellSubTitle";

/// Build the record for one located row. `position` is 1-based within the page.
pub fn extract_record(
    row: ElementRef<'_>,
    position: usize,
    page: u32,
    config: &HarvestConfig,
) -> Record {
    let mut record = Record::new(position, page, &config.default_currency);
    for (name, pass) in PASSES {
        pass(row, &mut record);
        tracing::trace!("row {} after {} pass: valid={}", position, name, record.is_valid());
    }
    finish(&mut record, config);
    record
}

fn set_if_empty(field: &mut String, value: impl Into<String>) {
    if field.is_empty() {
        let value = value.into();
        if !value.is_empty() {
            *field = value;
        }
    }
}

fn child_text(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    first_within(scope, selector).map(text_of)
}

// ── Pass 1: keyed cells ───────────────────────────────────────────────────────

fn attribute_pass(row: ElementRef<'_>, r: &mut Record) {
    for cell in query_any_within(row, &[".ms-DetailsRow-cell", "[data-automation-key]"]) {
        let Some(key) = cell.value().attr("data-automation-key") else { continue };
        match key {
            "uuid" => {
                if let Some(t) = child_text(cell, ".internalId-link a.griCellTitle, a") {
                    set_if_empty(&mut r.electronic_number, t);
                }
                if let Some(t) = child_text(cell, SUBTITLE) {
                    set_if_empty(&mut r.internal_number, t);
                }
            }
            "dateTimeReceived" => {
                if let Some(t) = child_text(cell, TITLE) {
                    set_if_empty(&mut r.submission_date, t.clone());
                    set_if_empty(&mut r.issue_date, t);
                }
                if let Some(t) = child_text(cell, SUBTITLE) {
                    set_if_empty(&mut r.issue_time, t);
                }
            }
            "typeName" => {
                if let Some(t) = child_text(cell, TITLE).filter(|t| !t.is_empty()) {
                    r.document_type = t;
                }
                if let Some(t) = child_text(cell, SUBTITLE).filter(|t| !t.is_empty()) {
                    r.document_version = t;
                }
            }
            "total" => {
                if let Some(t) = child_text(cell, TITLE) {
                    set_total(r, &t);
                }
            }
            "issuerName" => {
                if let Some(t) = child_text(cell, TITLE) {
                    set_if_empty(&mut r.seller_name, t);
                }
                if let Some(t) = child_text(cell, SUBTITLE) {
                    set_if_empty(&mut r.seller_tax_number, t);
                }
            }
            "receiverName" => {
                if let Some(t) = child_text(cell, TITLE) {
                    set_if_empty(&mut r.buyer_name, t);
                }
                if let Some(t) = child_text(cell, SUBTITLE) {
                    set_if_empty(&mut r.buyer_tax_number, t);
                }
            }
            "submission" => {
                if let Some(t) = child_text(cell, "a.submissionId-link, a") {
                    set_if_empty(&mut r.purchase_order_ref, t.clone());
                    set_if_empty(&mut r.submission_id, t);
                }
            }
            "status" => {
                if let Some(status) = status_text(cell) {
                    set_if_empty(&mut r.status, status);
                }
            }
            _ => {}
        }
    }
}

fn status_text(cell: ElementRef<'_>) -> Option<String> {
    if let Some(pair) = first_within(cell, ".horizontal.valid-rejected") {
        let valid = child_text(pair, ".status-Valid")?;
        let rejected = child_text(pair, ".status-Rejected")?;
        return Some(format!("{} → {}", valid, rejected));
    }
    child_text(cell, ".textStatus, .griCellTitle, .griCellTitleGray")
}

fn set_total(r: &mut Record, text: &str) {
    set_if_empty(&mut r.total_invoice, text);
    set_if_empty(&mut r.total_amount, text);
}

// ── Pass 2: cell positions ────────────────────────────────────────────────────

fn positional_pass(row: ElementRef<'_>, r: &mut Record) {
    let cells = query_any_within(row, &[".ms-DetailsRow-cell", "td", r#"[role="gridcell"]"#]);
    if cells.len() < 6 {
        return;
    }

    if r.electronic_number.is_empty() {
        if let Some(t) = child_text(cells[0], "a") {
            set_if_empty(&mut r.electronic_number, t);
        }
    }

    if r.total_amount.is_empty() {
        if let Some(t) = cells[2..cells.len().min(8)]
            .iter()
            .map(|c| text_of(*c))
            .find(|t| !t.is_empty() && looks_like_amount_cell(t))
        {
            set_total(r, &t);
        }
    }

    if r.issue_date.is_empty() {
        if let Some(date) = cells[1..cells.len().min(5)]
            .iter()
            .find_map(|c| DMY_DATE.find(&text_of(*c)).map(|m| m.as_str().to_string()))
        {
            set_if_empty(&mut r.submission_date, date.clone());
            set_if_empty(&mut r.issue_date, date);
        }
    }
}

// ── Pass 3: whole-row text ────────────────────────────────────────────────────

fn free_text_pass(row: ElementRef<'_>, r: &mut Record) {
    let text: String = row.text().collect();

    if let Some(m) = ELECTRONIC_NUMBER.find(&text) {
        set_if_empty(&mut r.electronic_number, m.as_str());
    }
    if let Some(m) = DMY_DATE.find(&text) {
        set_if_empty(&mut r.submission_date, m.as_str());
        set_if_empty(&mut r.issue_date, m.as_str());
    }
    if let Some(m) = CURRENCY_AMOUNT.find(&text) {
        set_total(r, m.as_str().trim());
    }
}

// ── Derived fields ────────────────────────────────────────────────────────────

fn finish(r: &mut Record, config: &HarvestConfig) {
    if !r.total_amount.is_empty() {
        let total = parse_amount(&r.total_amount);
        if total > 0.0 {
            let (net, vat) = split_vat(total, config.vat_rate);
            set_if_empty(&mut r.vat_amount, format_amount(vat));
            set_if_empty(&mut r.invoice_value, format_amount(net));
        }
        if let Some(currency) = detect_currency(&r.total_amount) {
            r.invoice_currency = currency.clone();
            r.currency = currency;
        }
    }

    if !r.seller_name.is_empty() {
        set_if_empty(&mut r.seller_address, UNSPECIFIED_ADDRESS);
    }
    if !r.buyer_name.is_empty() {
        set_if_empty(&mut r.buyer_address, UNSPECIFIED_ADDRESS);
    }

    r.issue_date_iso = parse_date(&r.issue_date);

    if !r.electronic_number.is_empty() {
        r.external_link = external_link(
            &config.portal_base_url,
            &r.electronic_number,
            &r.submission_id,
        );
    }
}

/// Share id: the submission id when it is long enough to be real, else the
/// electronic number reduced to at most 26 alphanumerics.
pub fn share_id(electronic_number: &str, submission_id: &str) -> String {
    if submission_id.chars().count() > 10 {
        return submission_id.to_string();
    }
    electronic_number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(26)
        .collect()
}

pub fn external_link(base: &str, electronic_number: &str, submission_id: &str) -> String {
    format!(
        "{}/documents/{}/share/{}",
        base.trim_end_matches('/'),
        electronic_number,
        share_id(electronic_number, submission_id)
    )
}
