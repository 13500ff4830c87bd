//! Core domain model for cross-source trade-disclosure reconciliation.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "tdr-core";

/// How certain we are that a record's authoritative link matches the transaction.
///
/// Variants are declared low to high so the derived `Ord` ranks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Confidence {
    #[default]
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MED", alias = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MED",
            Confidence::High => "HIGH",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "CEO")]
    Ceo,
    #[serde(rename = "CFO")]
    Cfo,
    Director,
    #[serde(rename = "10% Owner")]
    TenPercentOwner,
    Officer,
    Legislator,
    Other,
}

impl Role {
    /// Bucket a free-text relationship cell ("Chief Executive Officer", "Dir, 10%") into a role.
    pub fn from_label(label: &str) -> Option<Self> {
        let r = label.trim().to_ascii_lowercase();
        if r.is_empty() {
            return None;
        }
        let role = if r.contains("chief executive") || r.starts_with("ceo") {
            Role::Ceo
        } else if r.contains("chief financial") || r.starts_with("cfo") {
            Role::Cfo
        } else if r.contains("director") || r.starts_with("dir") {
            Role::Director
        } else if r.contains("10%") || r.contains("ten percent") || r.contains("owner") {
            Role::TenPercentOwner
        } else if r.contains("officer") {
            Role::Officer
        } else if r.contains("congress")
            || r.contains("senat")
            || r.contains("house")
            || r.contains("representative")
        {
            Role::Legislator
        } else {
            Role::Other
        };
        Some(role)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ceo => "CEO",
            Role::Cfo => "CFO",
            Role::Director => "Director",
            Role::TenPercentOwner => "10% Owner",
            Role::Officer => "Officer",
            Role::Legislator => "Legislator",
            Role::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionKind {
    Buy,
    Award,
    Option,
    Sell,
    Exchange,
    #[default]
    Other,
}

impl TransactionKind {
    /// Map an insider-report transaction code. Cells like `P - Purchase` use their leading code.
    pub fn from_code(code: &str) -> Self {
        let lead = code
            .trim()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase());
        match lead {
            Some('P') => TransactionKind::Buy,
            Some('S') => TransactionKind::Sell,
            Some('A') => TransactionKind::Award,
            Some('M') | Some('X') => TransactionKind::Option,
            Some('C') | Some('K') => TransactionKind::Exchange,
            _ => TransactionKind::Other,
        }
    }

    pub fn from_label(label: &str) -> Self {
        let t = label.to_ascii_lowercase();
        if t.contains("buy") || t.contains("purchase") {
            TransactionKind::Buy
        } else if t.contains("award") || t.contains("grant") {
            TransactionKind::Award
        } else if t.contains("option") || t.contains("exercise") {
            TransactionKind::Option
        } else if t.contains("sale") || t.contains("sell") || t.contains("sold") {
            TransactionKind::Sell
        } else if t.contains("exchange") || t.contains("conversion") {
            TransactionKind::Exchange
        } else {
            TransactionKind::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Buy => "Buy",
            TransactionKind::Award => "Award",
            TransactionKind::Option => "Option",
            TransactionKind::Sell => "Sell",
            TransactionKind::Exchange => "Exchange",
            TransactionKind::Other => "Other",
        }
    }
}

/// Values that can sit in an optional record field and may still be unusable when present.
pub trait FieldValue {
    fn is_usable(&self) -> bool;
}

impl FieldValue for String {
    fn is_usable(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl FieldValue for f64 {
    fn is_usable(&self) -> bool {
        self.is_finite()
    }
}

impl FieldValue for NaiveDate {
    fn is_usable(&self) -> bool {
        true
    }
}

impl FieldValue for Role {
    fn is_usable(&self) -> bool {
        true
    }
}

/// The single presence check used for every optional field.
pub fn is_present<T: FieldValue>(value: &Option<T>) -> bool {
    value.as_ref().is_some_and(FieldValue::is_usable)
}

/// Fill `slot` from `candidate` when `slot` is not present. Returns whether a fill happened.
pub fn fill_if_missing<T: FieldValue + Clone>(slot: &mut Option<T>, candidate: &Option<T>) -> bool {
    if !is_present(slot) && is_present(candidate) {
        *slot = candidate.clone();
        true
    } else {
        false
    }
}

/// A trade disclosure as captured from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTradeRecord {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub subject_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub transaction_kind: TransactionKind,
    #[serde(default)]
    pub trade_date: Option<NaiveDate>,
    #[serde(default)]
    pub filing_date: Option<NaiveDate>,
    #[serde(default)]
    pub shares: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub authoritative_link: Option<String>,
    pub source: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub fingerprint: String,
    /// When the source captured this row; breaks ties between exact duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl RawTradeRecord {
    pub fn new(
        ticker: impl Into<String>,
        subject_name: impl Into<String>,
        transaction_kind: TransactionKind,
        source: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: None,
            subject_name: subject_name.into(),
            role: None,
            transaction_kind,
            trade_date: None,
            filing_date: None,
            shares: None,
            price: None,
            value: None,
            authoritative_link: None,
            source: source.into(),
            source_url: String::new(),
            confidence: Confidence::Low,
            fingerprint: String::new(),
            observed_at: None,
        }
    }

    pub fn has_archive_link(&self) -> bool {
        self.authoritative_link
            .as_deref()
            .is_some_and(links::is_archive_link)
    }

    /// Reject records missing required fields or carrying impossible quantities.
    pub fn validate(&self) -> Result<(), RejectReason> {
        if self.ticker.trim().is_empty() {
            return Err(RejectReason::MissingTicker);
        }
        if self.subject_name.trim().is_empty() {
            return Err(RejectReason::MissingSubject);
        }
        for (field, value) in [("shares", self.shares), ("price", self.price)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(RejectReason::InvalidQuantity { field, value: v });
                }
            }
        }
        Ok(())
    }
}

/// A filing entry from the regulator's per-company filing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingReference {
    pub registry_id: String,
    pub filing_accession_id: String,
    pub filing_date: Option<NaiveDate>,
    pub filing_form_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document: Option<String>,
}

impl FilingReference {
    pub fn index_url(&self) -> String {
        links::filing_index_url(&self.registry_id, &self.filing_accession_id)
    }
}

/// Canonical output record. `source` and `source_url` name the one record it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub ticker: String,
    pub company_name: Option<String>,
    pub subject_name: String,
    pub role: Option<Role>,
    pub transaction_kind: TransactionKind,
    pub trade_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub shares: Option<f64>,
    pub price: Option<f64>,
    pub value: Option<f64>,
    pub authoritative_link: Option<String>,
    pub source: String,
    pub source_url: String,
    pub confidence: Confidence,
    pub fingerprint: String,
    /// Number of input records folded into this one, itself included.
    pub member_count: usize,
}

impl ReconciledRecord {
    pub fn from_raw(record: RawTradeRecord, member_count: usize) -> Self {
        Self {
            ticker: record.ticker,
            company_name: record.company_name,
            subject_name: record.subject_name,
            role: record.role,
            transaction_kind: record.transaction_kind,
            trade_date: record.trade_date,
            filing_date: record.filing_date,
            shares: record.shares,
            price: record.price,
            value: record.value,
            authoritative_link: record.authoritative_link,
            source: record.source,
            source_url: record.source_url,
            confidence: record.confidence,
            fingerprint: record.fingerprint,
            member_count,
        }
    }
}

impl From<ReconciledRecord> for RawTradeRecord {
    fn from(record: ReconciledRecord) -> Self {
        Self {
            ticker: record.ticker,
            company_name: record.company_name,
            subject_name: record.subject_name,
            role: record.role,
            transaction_kind: record.transaction_kind,
            trade_date: record.trade_date,
            filing_date: record.filing_date,
            shares: record.shares,
            price: record.price,
            value: record.value,
            authoritative_link: record.authoritative_link,
            source: record.source,
            source_url: record.source_url,
            confidence: record.confidence,
            fingerprint: record.fingerprint,
            observed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum RejectReason {
    #[error("ticker is missing")]
    MissingTicker,
    #[error("subject_name is missing")]
    MissingSubject,
    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidQuantity { field: &'static str, value: f64 },
}

/// A record dropped from a batch, with enough context to trace it back to its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub source: String,
    pub ticker: String,
    pub reason: RejectReason,
}

/// Zero-pad numeric registry ids to ten digits; other ids are trimmed and kept.
pub fn normalize_registry_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{trimmed:0>10}"))
    } else {
        Some(trimmed.to_string())
    }
}

/// Link builders for the regulator's archive and search endpoints.
pub mod links {
    use chrono::{Datelike, NaiveDate};

    pub const ARCHIVE_PATH: &str = "sec.gov/archives/";
    pub const ARCHIVE_BASE: &str = "https://www.sec.gov/Archives/edgar/data";
    pub const SUBMISSIONS_BASE: &str = "https://data.sec.gov/submissions";
    pub const SEARCH_BASE: &str = "https://efts.sec.gov/LATEST/search-index";

    pub fn is_archive_link(link: &str) -> bool {
        link.to_ascii_lowercase().contains(ARCHIVE_PATH)
    }

    pub fn filing_index_url(registry_id: &str, accession: &str) -> String {
        let cik = registry_id.trim().trim_start_matches('0');
        let cik = if cik.is_empty() { "0" } else { cik };
        let accession = accession.trim();
        let compact = accession.replace('-', "");
        format!("{ARCHIVE_BASE}/{cik}/{compact}/{accession}-index.html")
    }

    pub fn registry_landing_url(registry_id: &str) -> String {
        format!("{SUBMISSIONS_BASE}/CIK{:0>10}.json", registry_id.trim())
    }

    /// Full-text search link for manual verification when no registry id is known.
    pub fn verification_search_url(
        subject_name: &str,
        ticker: &str,
        date: Option<NaiveDate>,
    ) -> String {
        let name = subject_name.split_whitespace().collect::<Vec<_>>().join("+");
        let ticker = ticker.trim().to_ascii_uppercase();
        let (start, end) = match date.and_then(|d| d.with_day(1).map(|first| (first, d))) {
            Some((first, d)) => (first.to_string(), d.to_string()),
            None => ("2001-01-01".to_string(), "2099-12-31".to_string()),
        };
        format!(
            "{SEARCH_BASE}?q=%22{name}%22+%22{ticker}%22&forms=4&dateRange=custom&startdt={start}&enddt={end}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn confidence_orders_low_to_high_and_uses_stable_labels() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"MED\"");
        let parsed: Confidence = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(parsed, Confidence::Medium);
    }

    #[test]
    fn role_buckets_follow_first_matching_keyword() {
        assert_eq!(Role::from_label("Chief Executive Officer"), Some(Role::Ceo));
        assert_eq!(Role::from_label("CFO"), Some(Role::Cfo));
        assert_eq!(Role::from_label("Dir, 10%"), Some(Role::Director));
        assert_eq!(Role::from_label("10% Owner"), Some(Role::TenPercentOwner));
        assert_eq!(Role::from_label("EVP, Officer"), Some(Role::Officer));
        assert_eq!(Role::from_label("U.S. Senator"), Some(Role::Legislator));
        assert_eq!(Role::from_label("Trustee"), Some(Role::Other));
        assert_eq!(Role::from_label("  "), None);
    }

    #[test]
    fn transaction_codes_and_labels_map_to_kinds() {
        assert_eq!(TransactionKind::from_code("P - Purchase"), TransactionKind::Buy);
        assert_eq!(TransactionKind::from_code("s"), TransactionKind::Sell);
        assert_eq!(TransactionKind::from_code("M"), TransactionKind::Option);
        assert_eq!(TransactionKind::from_code("G"), TransactionKind::Other);
        assert_eq!(TransactionKind::from_label("Option Exercise"), TransactionKind::Option);
        assert_eq!(TransactionKind::from_label("Sale"), TransactionKind::Sell);
        assert_eq!(TransactionKind::from_label("Grant"), TransactionKind::Award);
    }

    #[test]
    fn presence_treats_blank_strings_and_nan_as_missing() {
        assert!(!is_present::<String>(&None));
        assert!(!is_present(&Some("   ".to_string())));
        assert!(is_present(&Some("ACME".to_string())));
        assert!(!is_present(&Some(f64::NAN)));
        assert!(is_present(&Some(0.0)));

        let mut slot = Some(f64::NAN);
        assert!(fill_if_missing(&mut slot, &Some(12.5)));
        assert_eq!(slot, Some(12.5));
        assert!(!fill_if_missing(&mut slot, &Some(99.0)));
        assert_eq!(slot, Some(12.5));
    }

    #[test]
    fn validation_rejects_missing_identity_and_negative_quantities() {
        let mut record = RawTradeRecord::new("ACME", "Smith Jane", TransactionKind::Buy, "openinsider");
        assert!(record.validate().is_ok());

        record.shares = Some(-5.0);
        assert_eq!(
            record.validate(),
            Err(RejectReason::InvalidQuantity { field: "shares", value: -5.0 })
        );

        record.shares = None;
        record.subject_name = " ".into();
        assert_eq!(record.validate(), Err(RejectReason::MissingSubject));

        record.ticker = String::new();
        assert_eq!(record.validate(), Err(RejectReason::MissingTicker));
    }

    #[test]
    fn registry_ids_are_zero_padded() {
        assert_eq!(normalize_registry_id("320193").as_deref(), Some("0000320193"));
        assert_eq!(normalize_registry_id(" ").as_deref(), None);
        assert_eq!(normalize_registry_id("X-12").as_deref(), Some("X-12"));
    }

    #[test]
    fn link_builders_produce_regulator_urls() {
        assert_eq!(
            links::filing_index_url("0000320193", "0000320193-25-000010"),
            "https://www.sec.gov/Archives/edgar/data/320193/000032019325000010/0000320193-25-000010-index.html"
        );
        assert_eq!(
            links::registry_landing_url("320193"),
            "https://data.sec.gov/submissions/CIK0000320193.json"
        );
        assert!(links::is_archive_link(
            "https://WWW.SEC.GOV/Archives/edgar/data/1/2/3-index.html"
        ));
        assert!(!links::is_archive_link("https://openinsider.com/AAPL"));

        let url = links::verification_search_url("Smith  Jane", "acme", Some(d(2025, 3, 14)));
        assert!(url.contains("q=%22Smith+Jane%22+%22ACME%22"));
        assert!(url.ends_with("startdt=2025-03-01&enddt=2025-03-14"));
    }
}
