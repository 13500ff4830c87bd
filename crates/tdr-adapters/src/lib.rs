//! Source adapter contracts + capture-first adapter implementations.
//!
//! Each adapter turns a captured table (headers plus string cells, as scraped from one
//! source) into [`RawTradeRecord`]s. Fetching and HTML parsing happen upstream.

pub mod cells;
pub mod snapshots;

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tdr_core::{Confidence, RawTradeRecord, Role, TransactionKind};
use thiserror::Error;
use tracing::debug;

pub use cells::{parse_date_cell, parse_money_cell, parse_shares_cell};
pub use snapshots::{load_company_tickers, load_submissions, parse_company_tickers, parse_submissions};

pub const CRATE_NAME: &str = "tdr-adapters";

pub const SOURCE_IDS: &[&str] = &["openinsider", "secform4", "edgar-form4"];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("bundle source_id={bundle} does not match adapter source_id={adapter}")]
    SourceMismatch { bundle: String, adapter: &'static str },
    #[error("{source_id}: no column for {field} in headers {headers:?}")]
    MissingColumn {
        source_id: String,
        field: &'static str,
        headers: Vec<String>,
    },
    #[error("{0}")]
    Message(String),
}

pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn parse_bundle(&self, bundle: &SourceBundle) -> Result<Vec<RawTradeRecord>, AdapterError>;
}

/// One captured result table from a source, plus where and when it was captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBundle {
    pub bundle_id: String,
    pub source_id: String,
    pub captured_from_url: String,
    pub fetched_at: DateTime<Utc>,
    pub extractor_version: String,
    /// Used for rows whose table has no ticker column (per-company pages).
    #[serde(default)]
    pub ticker_hint: Option<String>,
    #[serde(default)]
    pub company_hint: Option<String>,
    pub table: CapturedTable,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn load_source_bundle(path: impl AsRef<Path>) -> Result<SourceBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

static ARCHIVE_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://(?:www\.)?sec\.gov/Archives/edgar/data/[^\s"'<>]+"#).ok()
});

/// Find the first `http(s)://(www.)sec.gov/Archives/edgar/data/...` URL inside free text.
pub fn extract_archive_link(text: &str) -> Option<String> {
    ARCHIVE_LINK
        .as_ref()?
        .find(text)
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderMatch {
    Exact,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KindCell {
    Code,
    Label,
}

/// Header aliases per record field, tried in order.
#[derive(Debug)]
struct ColumnAliases {
    trade_date: &'static [&'static str],
    filing_date: &'static [&'static str],
    link: &'static [&'static str],
    ticker: &'static [&'static str],
    company: &'static [&'static str],
    subject: &'static [&'static str],
    role: &'static [&'static str],
    kind: &'static [&'static str],
    shares: &'static [&'static str],
    price: &'static [&'static str],
    value: &'static [&'static str],
}

static OPENINSIDER_COLUMNS: ColumnAliases = ColumnAliases {
    trade_date: &["Trade Date"],
    filing_date: &["Filing Date"],
    link: &["SEC Form 4", "SEC"],
    ticker: &["Ticker"],
    company: &["Company", "Company Name"],
    subject: &["Insider Name", "Insider"],
    role: &["Title"],
    kind: &["Trade Type", "Type"],
    shares: &["Qty", "Shares"],
    price: &["Price"],
    value: &["Value"],
};

static SECFORM4_COLUMNS: ColumnAliases = ColumnAliases {
    trade_date: &["transaction date", "trade date"],
    filing_date: &["reported", "filing date", "filed"],
    link: &["view", "filing", "link"],
    ticker: &["symbol", "ticker"],
    company: &["company", "issuer"],
    subject: &["insider", "reporting"],
    role: &["relationship", "title", "role"],
    kind: &["transaction", "type"],
    shares: &["shares", "amount"],
    price: &["price"],
    value: &["value", "total"],
};

static EDGAR_FORM4_COLUMNS: ColumnAliases = ColumnAliases {
    trade_date: &["Transaction Date"],
    filing_date: &["Filing Date"],
    link: &["Filing URL"],
    ticker: &["Ticker", "Issuer Ticker"],
    company: &["Issuer"],
    subject: &["Reporting Owner"],
    role: &["Relationship"],
    kind: &["Transaction Code"],
    shares: &["Shares"],
    price: &["Price"],
    value: &["Value"],
};

/// Column positions resolved against one bundle's header row.
#[derive(Debug, Default)]
struct ColumnIndex {
    trade_date: Option<usize>,
    filing_date: Option<usize>,
    link: Option<usize>,
    ticker: Option<usize>,
    company: Option<usize>,
    subject: Option<usize>,
    role: Option<usize>,
    kind: Option<usize>,
    shares: Option<usize>,
    price: Option<usize>,
    value: Option<usize>,
}

/// Resolves header aliases; a header claimed by one field is never reused by a later one,
/// so "Transaction Date" cannot also satisfy a loose "transaction" match.
struct HeaderResolver {
    headers: Vec<String>,
    claimed: Vec<bool>,
    mode: HeaderMatch,
}

impl HeaderResolver {
    fn new(raw: &[String], mode: HeaderMatch) -> Self {
        Self {
            headers: raw.iter().map(|h| h.trim().to_ascii_lowercase()).collect(),
            claimed: vec![false; raw.len()],
            mode,
        }
    }

    fn claim(&mut self, aliases: &[&str]) -> Option<usize> {
        for alias in aliases {
            let alias = alias.to_ascii_lowercase();
            let hit = self.headers.iter().enumerate().find_map(|(i, h)| {
                let matched = match self.mode {
                    HeaderMatch::Exact => *h == alias,
                    HeaderMatch::Contains => h.contains(alias.as_str()),
                };
                (matched && !self.claimed[i]).then_some(i)
            });
            if let Some(i) = hit {
                self.claimed[i] = true;
                return Some(i);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct TableAdapter {
    source_id: &'static str,
    header_match: HeaderMatch,
    kind_cell: KindCell,
    columns: &'static ColumnAliases,
}

impl TableAdapter {
    fn resolve_columns(&self, headers: &[String]) -> ColumnIndex {
        let c = self.columns;
        let mut r = HeaderResolver::new(headers, self.header_match);
        // Date columns first: their headers are the most specific.
        ColumnIndex {
            trade_date: r.claim(c.trade_date),
            filing_date: r.claim(c.filing_date),
            link: r.claim(c.link),
            ticker: r.claim(c.ticker),
            company: r.claim(c.company),
            subject: r.claim(c.subject),
            role: r.claim(c.role),
            kind: r.claim(c.kind),
            shares: r.claim(c.shares),
            price: r.claim(c.price),
            value: r.claim(c.value),
        }
    }

    fn row_to_record(
        &self,
        bundle: &SourceBundle,
        columns: &ColumnIndex,
        row: &[String],
    ) -> RawTradeRecord {
        let cell = |index: Option<usize>| index.and_then(|i| row.get(i)).map(String::as_str);
        let text = |index: Option<usize>| cell(index).and_then(cells::text_or_none);

        let ticker = text(columns.ticker)
            .or_else(|| bundle.ticker_hint.clone())
            .unwrap_or_default();
        let subject = text(columns.subject).unwrap_or_default();
        let kind = match (text(columns.kind), self.kind_cell) {
            (Some(k), KindCell::Code) => TransactionKind::from_code(&k),
            (Some(k), KindCell::Label) => TransactionKind::from_label(&k),
            (None, _) => TransactionKind::Other,
        };

        let mut record = RawTradeRecord::new(ticker.trim().to_ascii_uppercase(), subject, kind, self.source_id);
        record.company_name = text(columns.company).or_else(|| bundle.company_hint.clone());
        record.role = text(columns.role).and_then(|r| Role::from_label(&r));
        record.trade_date = cell(columns.trade_date).and_then(parse_date_cell);
        record.filing_date = cell(columns.filing_date).and_then(parse_date_cell);
        record.shares = cell(columns.shares).and_then(parse_shares_cell);
        record.price = cell(columns.price).and_then(parse_money_cell).map(f64::abs);
        record.value = cell(columns.value).and_then(parse_money_cell);

        if let Some(raw_link) = text(columns.link) {
            record.authoritative_link = extract_archive_link(&raw_link).or_else(|| {
                raw_link
                    .to_ascii_lowercase()
                    .starts_with("http")
                    .then_some(raw_link)
            });
        }
        record.confidence = if record.has_archive_link() {
            Confidence::High
        } else {
            Confidence::Low
        };
        record.source_url = bundle.captured_from_url.clone();
        record.observed_at = Some(bundle.fetched_at);
        record.fingerprint = tdr_reconcile::fingerprint_record(&record);
        record
    }
}

impl SourceAdapter for TableAdapter {
    fn source_id(&self) -> &'static str {
        self.source_id
    }

    fn parse_bundle(&self, bundle: &SourceBundle) -> Result<Vec<RawTradeRecord>, AdapterError> {
        if bundle.source_id != self.source_id {
            return Err(AdapterError::SourceMismatch {
                bundle: bundle.source_id.clone(),
                adapter: self.source_id,
            });
        }
        let columns = self.resolve_columns(&bundle.table.headers);
        if columns.subject.is_none() {
            return Err(AdapterError::MissingColumn {
                source_id: self.source_id.to_string(),
                field: "subject_name",
                headers: bundle.table.headers.clone(),
            });
        }
        if columns.ticker.is_none() && bundle.ticker_hint.is_none() {
            return Err(AdapterError::MissingColumn {
                source_id: self.source_id.to_string(),
                field: "ticker",
                headers: bundle.table.headers.clone(),
            });
        }

        let mut blank_rows = 0usize;
        let records = bundle
            .table
            .rows
            .iter()
            .filter(|row| {
                let blank = row.iter().all(|c| c.trim().is_empty());
                blank_rows += usize::from(blank);
                !blank
            })
            .map(|row| self.row_to_record(bundle, &columns, row))
            .collect::<Vec<_>>();

        debug!(
            source = self.source_id,
            bundle = %bundle.bundle_id,
            rows = bundle.table.rows.len(),
            records = records.len(),
            blank_rows,
            "parsed source bundle"
        );
        Ok(records)
    }
}

pub fn openinsider_adapter() -> impl SourceAdapter {
    TableAdapter {
        source_id: "openinsider",
        header_match: HeaderMatch::Exact,
        kind_cell: KindCell::Code,
        columns: &OPENINSIDER_COLUMNS,
    }
}

pub fn secform4_adapter() -> impl SourceAdapter {
    TableAdapter {
        source_id: "secform4",
        header_match: HeaderMatch::Contains,
        kind_cell: KindCell::Label,
        columns: &SECFORM4_COLUMNS,
    }
}

pub fn edgar_form4_adapter() -> impl SourceAdapter {
    TableAdapter {
        source_id: "edgar-form4",
        header_match: HeaderMatch::Exact,
        kind_cell: KindCell::Code,
        columns: &EDGAR_FORM4_COLUMNS,
    }
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        "openinsider" => Some(Box::new(openinsider_adapter())),
        "secform4" => Some(Box::new(secform4_adapter())),
        "edgar-form4" => Some(Box::new(edgar_form4_adapter())),
        _ => None,
    }
}
