//! Cross-source trade-record reconciliation.
//!
//! [`reconcile`] is a pure batch transform: records in, canonical records out. Every
//! lookup it needs (ticker table, filing lists) is handed in already fetched, so batches
//! can run on independent threads without coordination.

pub mod authority;
pub mod confidence;
pub mod filing;
pub mod filter;
pub mod fingerprint;
pub mod fuzzy;
pub mod sequence;

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tdr_core::{FilingReference, RawTradeRecord, ReconciledRecord, RejectedRecord};
use thiserror::Error;
use tracing::{debug, info};

pub use authority::{AuthorityEntry, AuthorityTable, Resolution};
pub use confidence::{classify, Classification, ClassificationRule};
pub use filing::{find_nearest_filing, nearest_filing, FilingIndex, FilingLookup, FilingMatch};
pub use filter::{DateWindow, TradeFilter};
pub use fingerprint::{fingerprint, fingerprint_record};
pub use fuzzy::{ClusterAudit, FuzzyConfig};
pub use sequence::finalize;

pub const CRATE_NAME: &str = "tdr-reconcile";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Max days between a matched filing and the record's date for HIGH confidence.
    pub tolerance_days: i64,
    pub share_bucket_size: u32,
    pub date_window_days: i64,
    pub qualifying_form_types: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance_days: 2,
            share_bucket_size: 10,
            date_window_days: 1,
            qualifying_form_types: vec!["4".to_string(), "4/A".to_string()],
        }
    }
}

impl ReconcileOptions {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.tolerance_days < 0 {
            return Err(ReconcileError::InvalidOptions(format!(
                "tolerance_days must be >= 0, got {}",
                self.tolerance_days
            )));
        }
        if self.date_window_days < 0 {
            return Err(ReconcileError::InvalidOptions(format!(
                "date_window_days must be >= 0, got {}",
                self.date_window_days
            )));
        }
        if self.share_bucket_size == 0 {
            return Err(ReconcileError::InvalidOptions(
                "share_bucket_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    fn fuzzy(&self) -> FuzzyConfig {
        FuzzyConfig {
            share_bucket_size: self.share_bucket_size,
            date_window_days: self.date_window_days,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid reconcile options: {0}")]
    InvalidOptions(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub input: usize,
    pub rejected: usize,
    pub unresolved_tickers: usize,
    pub exact_duplicates: usize,
    pub clusters: usize,
    pub merged_members: usize,
    pub output: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub records: Vec<ReconciledRecord>,
    pub rejected: Vec<RejectedRecord>,
    pub clusters: Vec<ClusterAudit>,
    pub stats: ReconcileStats,
}

/// Resolve, match, and classify one record in place. Returns whether the ticker resolved.
fn enrich<'a, L: FilingLookup + ?Sized>(
    record: &mut RawTradeRecord,
    authority: &AuthorityTable,
    filings: &'a L,
    filing_cache: &mut HashMap<String, Cow<'a, [FilingReference]>>,
    options: &ReconcileOptions,
) -> bool {
    let resolution = authority.resolve(&record.ticker);
    if record.company_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        if let Some(name) = resolution.company_name {
            record.company_name = Some(name.to_string());
        }
    }

    let matched = match resolution.registry_id {
        Some(registry_id) if !record.has_archive_link() => {
            let candidates = filing_cache
                .entry(registry_id.to_string())
                .or_insert_with(|| filings.filings_for(registry_id));
            nearest_filing(
                &**candidates,
                record.trade_date,
                record.filing_date,
                &options.qualifying_form_types,
                options.tolerance_days,
            )
        }
        _ => None,
    };

    let classification = classify(
        record,
        resolution.registry_id,
        matched.as_ref().map(|m| &m.filing),
        options.tolerance_days,
    );
    debug!(
        ticker = %record.ticker,
        source = %record.source,
        registry_id = resolution.registry_id.unwrap_or("-"),
        rule = ?classification.rule,
        confidence = %classification.confidence,
        "classified record"
    );
    classification.apply_to(record);
    resolution.is_resolved()
}

/// Reconcile one batch of raw records into canonical, deduplicated, ordered output.
///
/// Malformed records are reported in [`ReconcileReport::rejected`] and the rest of the
/// batch is still processed. Lookup misses degrade confidence instead of failing.
pub fn reconcile<L: FilingLookup + ?Sized>(
    records: Vec<RawTradeRecord>,
    authority: &AuthorityTable,
    filings: &L,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
    options.validate()?;

    let mut stats = ReconcileStats {
        input: records.len(),
        ..ReconcileStats::default()
    };
    let mut rejected = Vec::new();
    let mut accepted = Vec::with_capacity(records.len());
    let mut filing_cache = HashMap::new();

    for (index, mut record) in records.into_iter().enumerate() {
        if let Err(reason) = record.validate() {
            debug!(index, source = %record.source, %reason, "rejected record");
            rejected.push(RejectedRecord {
                index,
                source: record.source,
                ticker: record.ticker,
                reason,
            });
            continue;
        }
        record.ticker = fingerprint::normalize_ticker(&record.ticker);
        record.subject_name = record.subject_name.trim().to_string();
        record.fingerprint = fingerprint_record(&record);
        if !enrich(&mut record, authority, filings, &mut filing_cache, options) {
            stats.unresolved_tickers += 1;
        }
        accepted.push(record);
    }

    let outcome = fuzzy::reconcile_fuzzy(accepted, options.fuzzy());
    stats.rejected = rejected.len();
    stats.exact_duplicates = outcome.exact_duplicates;
    stats.clusters = outcome.audits.len();
    stats.merged_members = outcome
        .audits
        .iter()
        .map(|a| a.member_count.saturating_sub(1))
        .sum();

    let records = finalize(outcome.records);
    stats.output = records.len();

    info!(
        input = stats.input,
        rejected = stats.rejected,
        unresolved = stats.unresolved_tickers,
        exact_duplicates = stats.exact_duplicates,
        clusters = stats.clusters,
        merged_members = stats.merged_members,
        output = stats.output,
        "reconciled batch"
    );

    Ok(ReconcileReport {
        records,
        rejected,
        clusters: outcome.audits,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_values() {
        let options = ReconcileOptions::default();
        assert_eq!(options.tolerance_days, 2);
        assert_eq!(options.share_bucket_size, 10);
        assert_eq!(options.date_window_days, 1);
        assert_eq!(options.qualifying_form_types, vec!["4", "4/A"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn invalid_options_are_rejected_up_front() {
        let options = ReconcileOptions {
            share_bucket_size: 0,
            ..ReconcileOptions::default()
        };
        let err = reconcile(Vec::new(), &AuthorityTable::new(), &FilingIndex::new(), &options)
            .unwrap_err();
        assert!(err.to_string().contains("share_bucket_size"));
    }

    #[test]
    fn empty_batch_is_an_empty_report() {
        let report = reconcile(
            Vec::new(),
            &AuthorityTable::new(),
            &FilingIndex::new(),
            &ReconcileOptions::default(),
        )
        .unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.stats, ReconcileStats::default());
    }
}
