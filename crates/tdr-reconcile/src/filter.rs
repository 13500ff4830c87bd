//! Post-reconcile trade filters and the scan date window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tdr_core::{is_present, RawTradeRecord, ReconciledRecord, Role, TransactionKind};

use crate::fingerprint::normalize_ticker;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeFilter {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub transaction_kind: Option<TransactionKind>,
    /// Minimum absolute dollar value.
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub legislator_only: bool,
    #[serde(default)]
    pub since: Option<NaiveDate>,
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

impl TradeFilter {
    pub fn matches(&self, record: &ReconciledRecord) -> bool {
        if let Some(ticker) = &self.ticker {
            if normalize_ticker(ticker) != normalize_ticker(&record.ticker) {
                return false;
            }
        }
        if self
            .transaction_kind
            .is_some_and(|kind| kind != record.transaction_kind)
        {
            return false;
        }
        if let Some(min) = self.min_value {
            let value = if is_present(&record.value) { record.value } else { None };
            if !value.is_some_and(|v| v.abs() >= min) {
                return false;
            }
        }
        if self.legislator_only && record.role != Some(Role::Legislator) {
            return false;
        }
        if let Some(since) = self.since {
            if !record.trade_date.is_some_and(|d| d >= since) {
                return false;
            }
        }
        if let Some(until) = self.until {
            if !record.trade_date.is_some_and(|d| d <= until) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, records: Vec<ReconciledRecord>) -> Vec<ReconciledRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Inclusive scan window. Records are judged by trade date, falling back to filing date;
/// records with neither date are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    fn contains_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn contains(&self, record: &RawTradeRecord) -> bool {
        match (record.trade_date, record.filing_date) {
            (Some(trade), _) => self.contains_date(trade),
            (None, Some(filed)) => self.contains_date(filed),
            (None, None) => true,
        }
    }
}
