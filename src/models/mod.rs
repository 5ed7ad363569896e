use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DOCUMENT_TYPE: &str = "فاتورة";
pub const DEFAULT_DOCUMENT_VERSION: &str = "1.0";
pub const UNSPECIFIED_ADDRESS: &str = "غير محدد";

// ── Record ────────────────────────────────────────────────────────────────────

/// One invoice row as read from the listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub index: usize,
    pub page_number: u32,
    pub serial_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_index: Option<usize>,

    pub electronic_number: String,
    pub internal_number: String,
    pub submission_id: String,
    pub purchase_order_ref: String,

    pub document_type: String,
    pub document_version: String,
    pub status: String,

    pub issue_date: String,
    pub submission_date: String,
    pub issue_time: String,
    pub issue_date_iso: Option<NaiveDate>,

    pub seller_name: String,
    pub seller_tax_number: String,
    pub seller_address: String,
    pub buyer_name: String,
    pub buyer_tax_number: String,
    pub buyer_address: String,

    pub total_amount: String,
    pub total_invoice: String,
    pub invoice_value: String,
    pub vat_amount: String,
    pub tax_discount: String,
    pub currency: String,
    pub invoice_currency: String,

    pub external_link: String,
    pub details: Vec<LineItem>,
}

impl Record {
    /// Blank record for the given in-page position.
    pub fn new(index: usize, page_number: u32, currency: &str) -> Self {
        Self {
            index,
            page_number,
            serial_number: index,
            global_index: None,
            electronic_number: String::new(),
            internal_number: String::new(),
            submission_id: String::new(),
            purchase_order_ref: String::new(),
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            document_version: DEFAULT_DOCUMENT_VERSION.to_string(),
            status: String::new(),
            issue_date: String::new(),
            submission_date: String::new(),
            issue_time: String::new(),
            issue_date_iso: None,
            seller_name: String::new(),
            seller_tax_number: String::new(),
            seller_address: String::new(),
            buyer_name: String::new(),
            buyer_tax_number: String::new(),
            buyer_address: String::new(),
            total_amount: String::new(),
            total_invoice: String::new(),
            invoice_value: String::new(),
            vat_amount: String::new(),
            tax_discount: "0".to_string(),
            currency: currency.to_string(),
            invoice_currency: currency.to_string(),
            external_link: String::new(),
            details: Vec::new(),
        }
    }

    /// A record counts only if it carries at least one identifying value.
    pub fn is_valid(&self) -> bool {
        !self.electronic_number.is_empty()
            || !self.internal_number.is_empty()
            || !self.total_amount.is_empty()
    }
}

// ── Line items ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_code: String,
    pub description: String,
    pub unit_code: String,
    pub unit_name: String,
    pub quantity: String,
    pub unit_price: String,
    pub total_value: String,
    pub tax_amount: String,
    pub vat_amount: String,
}

// ── Pagination ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub current_page: u32,
    pub total_pages: u32,
    pub page_size: u32,
    pub total_count: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
            page_size: 50,
            total_count: 0,
        }
    }
}

// ── Command payloads ──────────────────────────────────────────────────────────

/// What `getInvoiceData` / `rescanPage` hand back to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPageData {
    pub invoices: Vec<Record>,
    pub total_count: usize,
    pub current_page: u32,
    pub total_pages: u32,
    pub page_size: u32,
    pub scanned_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub current_page: u32,
    pub total_pages: u32,
    pub message: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionOptions {
    /// Emit a progress push per page boundary.
    #[serde(default, alias = "progressCallback")]
    pub progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionResult {
    pub success: bool,
    pub data: Vec<Record>,
    pub total_processed: usize,
    pub expected_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_requires_an_identifier() {
        let mut r = Record::new(1, 1, "EGP");
        assert!(!r.is_valid());
        r.total_amount = "10.00 EGP".into();
        assert!(r.is_valid());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let r = Record::new(3, 2, "EGP");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["pageNumber"], 2);
        assert_eq!(v["serialNumber"], 3);
        assert_eq!(v["documentVersion"], "1.0");
        assert!(v.get("globalIndex").is_none());
    }

    #[test]
    fn test_options_accept_legacy_key() {
        let o: AcquisitionOptions = serde_json::from_str(r#"{"progressCallback": true}"#).unwrap();
        assert!(o.progress);
    }
}
