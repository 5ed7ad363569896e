use crate::utils::fmt_number;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

// ── Text patterns ─────────────────────────────────────────────────────────────

/// Long upper-case alphanumeric token, the shape of an electronic document UUID.
pub static LONG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z0-9]{15,}").expect("static regex"));

/// Same token bounded for extraction.
pub static ELECTRONIC_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z0-9]{15,30}").expect("static regex"));

/// Amount followed by a currency tag: "1,140.00 EGP", "250 جنيه".
pub static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+[,٬]?[0-9]*\.?[0-9]*\s*(?:EGP|جنيه)").expect("static regex")
});

pub static DMY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{1,2}/[0-9]{1,2}/[0-9]{4}").expect("static regex"));

static PLAIN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[0-9,]*\.?[0-9]*$").expect("static regex"));

static TRAILING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3})\s*$").expect("static regex"));

pub fn has_plausible_row_text(text: &str) -> bool {
    LONG_TOKEN.is_match(text) || CURRENCY_AMOUNT.is_match(text) || DMY_DATE.is_match(text)
}

/// A cell that holds nothing but an amount, optionally currency-tagged.
pub fn looks_like_amount_cell(text: &str) -> bool {
    if text.contains("EGP") || text.contains("جنيه") {
        return true;
    }
    let stripped: String = text.chars().filter(|c| *c != ',' && *c != '٬').collect();
    PLAIN_NUMBER.is_match(&stripped)
}

// ── Amounts ───────────────────────────────────────────────────────────────────

/// Parse a displayed amount: keep digits and the decimal point.
/// "1,140.00 EGP" → 1140.0 | "" → 0.0
pub fn parse_amount(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

/// Two decimals, half-up, thousands grouping. 1234.5 → "1,234.50"
pub fn format_amount(amount: f64) -> String {
    if amount == 0.0 || !amount.is_finite() {
        return "0".to_string();
    }
    let cents = (amount.abs() * 100.0).round() as i64;
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, fmt_number(cents / 100), cents % 100)
}

/// Split a VAT-inclusive total into (net value, VAT amount).
pub fn split_vat(total: f64, rate: f64) -> (f64, f64) {
    let vat = total * rate / (1.0 + rate);
    (total - vat, vat)
}

/// Currency named by an amount text, if any.
pub fn detect_currency(text: &str) -> Option<String> {
    if text.contains("جنيه") {
        return Some("EGP".to_string());
    }
    TRAILING_CODE
        .captures(text.trim())
        .map(|c| c[1].to_string())
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// Parse the portal's D/M/Y dates (optionally followed by a time).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let m = DMY_DATE.find(s)?;
    NaiveDate::parse_from_str(m.as_str(), "%d/%m/%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round2(x: f64) -> f64 {
        (x * 100.0).round() / 100.0
    }

    #[test]
    fn test_vat_split_sums_back_to_total() {
        for total in [0.0, 1.0, 114.0, 999.99, 1140.0, 12_345.67, 1_000_000.01] {
            let (net, vat) = split_vat(total, 0.14);
            assert!((round2(vat) - round2(total * 0.14 / 1.14)).abs() < 1e-9);
            assert!((round2(net) + round2(vat) - total).abs() <= 0.011, "total {}", total);
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(140.0), "140.00");
        assert_eq!(format_amount(1234.5), "1,234.50");
        assert_eq!(format_amount(1_000_000.125), "1,000,000.13");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,140.00 EGP"), 1140.0);
        assert_eq!(parse_amount("٬250 جنيه"), 250.0);
        assert_eq!(parse_amount(""), 0.0);
    }

    #[test]
    fn test_amount_cells() {
        assert!(looks_like_amount_cell("1,140.00"));
        assert!(looks_like_amount_cell("50 EGP"));
        assert!(!looks_like_amount_cell("15/03/2024"));
        assert!(!looks_like_amount_cell("Valid"));
    }

    #[test]
    fn test_detect_currency() {
        assert_eq!(detect_currency("1,000.00 USD").as_deref(), Some("USD"));
        assert_eq!(detect_currency("100 جنيه").as_deref(), Some("EGP"));
        assert_eq!(detect_currency("100"), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("5/3/2024 10:15 AM"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("not a date"), None);
    }
}
