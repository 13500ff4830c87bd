//! Deterministic identity keys for exact-duplicate detection.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tdr_core::{RawTradeRecord, ReconciledRecord, TransactionKind};

pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

/// Lower-cased, whitespace-collapsed name used for fuzzy bucketing. Fingerprints use the raw name.
pub fn normalize_subject(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn canonical_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            // -0 and 0 must serialize identically
            let v = if v == 0.0 { 0.0 } else { v };
            v.to_string()
        }
        _ => String::new(),
    }
}

fn canonical_key(
    ticker: &str,
    subject_name: &str,
    trade_date: Option<NaiveDate>,
    shares: Option<f64>,
    price: Option<f64>,
    transaction_kind: TransactionKind,
    source: &str,
) -> String {
    [
        normalize_ticker(ticker),
        subject_name.to_string(),
        trade_date.map(|d| d.to_string()).unwrap_or_default(),
        canonical_number(shares),
        canonical_number(price),
        transaction_kind.as_str().to_string(),
        source.trim().to_string(),
    ]
    .join("|")
}

/// SHA-256 over the pipe-joined canonical fields, hex encoded.
pub fn fingerprint(
    ticker: &str,
    subject_name: &str,
    trade_date: Option<NaiveDate>,
    shares: Option<f64>,
    price: Option<f64>,
    transaction_kind: TransactionKind,
    source: &str,
) -> String {
    let key = canonical_key(
        ticker,
        subject_name,
        trade_date,
        shares,
        price,
        transaction_kind,
        source,
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn fingerprint_record(record: &RawTradeRecord) -> String {
    fingerprint(
        &record.ticker,
        &record.subject_name,
        record.trade_date,
        record.shares,
        record.price,
        record.transaction_kind,
        &record.source,
    )
}

pub fn fingerprint_reconciled(record: &ReconciledRecord) -> String {
    fingerprint(
        &record.ticker,
        &record.subject_name,
        record.trade_date,
        record.shares,
        record.price,
        record.transaction_kind,
        &record.source,
    )
}
