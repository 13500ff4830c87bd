//! Normalization of captured string cells into typed values.

use chrono::{NaiveDate, NaiveDateTime};

const NULL_TOKENS: &[&str] = &["", "nan", "na", "n/a", "none", "null", "-", "--", "\u{2014}"];

fn is_null_token(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    NULL_TOKENS.contains(&lower.as_str())
}

pub fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_null_token(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY` and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_date_cell(value: &str) -> Option<NaiveDate> {
    let text = value.trim();
    if is_null_token(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .ok()
}

/// Parses money-ish cells like `$1,234.50`, `-$99`, `(1,000)` or `12 USD`.
pub fn parse_money_cell(value: &str) -> Option<f64> {
    let text = value.trim();
    if is_null_token(text) {
        return None;
    }
    let negative_parens = text.starts_with('(') && text.ends_with(')');
    let cleaned = text
        .trim_start_matches('(')
        .trim_end_matches(')')
        .replace("USD", "")
        .replace("usd", "")
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '+') && !c.is_whitespace())
        .collect::<String>();
    let parsed = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if negative_parens { -parsed.abs() } else { parsed })
}

/// Share counts are stored unsigned; sell rows often carry a leading minus.
pub fn parse_shares_cell(value: &str) -> Option<f64> {
    parse_money_cell(value).map(f64::abs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_in_all_captured_shapes() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 7);
        assert_eq!(parse_date_cell("2025-03-07"), expected);
        assert_eq!(parse_date_cell(" 03/07/2025 "), expected);
        assert_eq!(parse_date_cell("2025-03-07 18:04:11"), expected);
        assert_eq!(parse_date_cell("n/a"), None);
        assert_eq!(parse_date_cell("March 7"), None);
    }

    #[test]
    fn money_cells_strip_symbols_and_read_parentheses_as_negative() {
        assert_eq!(parse_money_cell("$1,234.50"), Some(1234.5));
        assert_eq!(parse_money_cell("-$99"), Some(-99.0));
        assert_eq!(parse_money_cell("(1,000)"), Some(-1000.0));
        assert_eq!(parse_money_cell("12 USD"), Some(12.0));
        assert_eq!(parse_money_cell("+$5"), Some(5.0));
        assert_eq!(parse_money_cell("\u{2014}"), None);
        assert_eq!(parse_money_cell("abc"), None);
    }

    #[test]
    fn share_counts_drop_the_sign() {
        assert_eq!(parse_shares_cell("-12,000"), Some(12000.0));
        assert_eq!(parse_shares_cell("+300"), Some(300.0));
    }

    #[test]
    fn null_tokens_become_none() {
        assert_eq!(text_or_none("  N/A "), None);
        assert_eq!(text_or_none(" Jane "), Some("Jane".to_string()));
    }
}
