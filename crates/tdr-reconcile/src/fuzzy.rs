//! Exact collapse and anchor-based fuzzy clustering of records from several sources.
//!
//! Clustering is deliberately not transitive: every member of a cluster is within the
//! date window of the cluster's anchor (its earliest-dated, highest-confidence record),
//! not merely of some other member. A chain of records one day apart therefore splits
//! into several clusters.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tdr_core::{fill_if_missing, RawTradeRecord, ReconciledRecord};
use tracing::debug;

use crate::fingerprint::{normalize_subject, normalize_ticker};

#[derive(Debug, Clone, Copy)]
pub struct FuzzyConfig {
    pub share_bucket_size: u32,
    pub date_window_days: i64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            share_bucket_size: 10,
            date_window_days: 1,
        }
    }
}

/// Provenance of one output record: which sources were folded into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAudit {
    pub ticker: String,
    pub subject_name: String,
    pub base_source: String,
    pub member_sources: Vec<String>,
    pub member_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FuzzyOutcome {
    pub records: Vec<ReconciledRecord>,
    pub audits: Vec<ClusterAudit>,
    pub exact_duplicates: usize,
}

type Priority = (tdr_core::Confidence, bool);

fn priority(record: &RawTradeRecord) -> Priority {
    (record.confidence, record.has_archive_link())
}

/// Keep one record per fingerprint: highest confidence, then archive link, then latest
/// `observed_at`. Earlier input wins remaining ties. Group order follows first appearance.
pub fn collapse_exact(records: Vec<RawTradeRecord>) -> (Vec<RawTradeRecord>, usize) {
    let mut slots: Vec<RawTradeRecord> = Vec::with_capacity(records.len());
    let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
    let mut dropped = 0usize;

    for record in records {
        match by_fingerprint.get(&record.fingerprint) {
            Some(&slot) => {
                dropped += 1;
                let current = &slots[slot];
                let candidate_key = (priority(&record), record.observed_at);
                let current_key = (priority(current), current.observed_at);
                if candidate_key > current_key {
                    slots[slot] = record;
                }
            }
            None => {
                by_fingerprint.insert(record.fingerprint.clone(), slots.len());
                slots.push(record);
            }
        }
    }

    (slots, dropped)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BucketKey {
    ticker: String,
    subject: String,
    share_bucket: Option<i64>,
}

fn share_bucket(shares: Option<f64>, bucket_size: u32) -> Option<i64> {
    let size = f64::from(bucket_size.max(1));
    shares
        .filter(|s| s.is_finite())
        .map(|s| ((s / size).round() * size) as i64)
}

fn within_window(anchor: &RawTradeRecord, other: &RawTradeRecord, window_days: i64) -> bool {
    match (anchor.trade_date, other.trade_date) {
        (Some(a), Some(b)) => (b - a).num_days().abs() <= window_days,
        (None, None) => true,
        _ => false,
    }
}

/// Partition records into clusters of plausible duplicates.
pub fn cluster(records: Vec<RawTradeRecord>, config: FuzzyConfig) -> Vec<Vec<RawTradeRecord>> {
    let mut buckets: BTreeMap<BucketKey, Vec<RawTradeRecord>> = BTreeMap::new();
    for record in records {
        let key = BucketKey {
            ticker: normalize_ticker(&record.ticker),
            subject: normalize_subject(&record.subject_name),
            share_bucket: share_bucket(record.shares, config.share_bucket_size),
        };
        buckets.entry(key).or_default().push(record);
    }

    let mut clusters = Vec::new();
    for (_, mut members) in buckets {
        // dated first, ascending; undated last. Stable, so input order breaks ties.
        members.sort_by_key(|r| (r.trade_date.is_none(), r.trade_date, Reverse(r.confidence)));

        let mut slots: Vec<Option<RawTradeRecord>> = members.into_iter().map(Some).collect();
        for i in 0..slots.len() {
            let Some(anchor) = slots[i].take() else {
                continue;
            };
            let mut group = Vec::new();
            for slot in slots.iter_mut().skip(i + 1) {
                if slot
                    .as_ref()
                    .is_some_and(|other| within_window(&anchor, other, config.date_window_days))
                {
                    group.extend(slot.take());
                }
            }
            group.insert(0, anchor);
            clusters.push(group);
        }
    }
    clusters
}

/// Merge one cluster into a single record built on its highest-priority member.
///
/// Missing fields on the base are filled from the other members in priority order, the
/// first filler wins, and confidence rises to the cluster maximum.
pub fn merge_cluster(mut members: Vec<RawTradeRecord>) -> Option<(ReconciledRecord, ClusterAudit)> {
    if members.is_empty() {
        return None;
    }
    members.sort_by_key(|r| Reverse(priority(r)));
    let member_count = members.len();
    let member_sources = members.iter().map(|m| m.source.clone()).collect::<Vec<_>>();

    let mut rest = members.into_iter();
    let mut base = rest.next()?;
    for other in rest {
        fill_if_missing(&mut base.company_name, &other.company_name);
        fill_if_missing(&mut base.role, &other.role);
        fill_if_missing(&mut base.trade_date, &other.trade_date);
        fill_if_missing(&mut base.filing_date, &other.filing_date);
        fill_if_missing(&mut base.shares, &other.shares);
        fill_if_missing(&mut base.price, &other.price);
        fill_if_missing(&mut base.value, &other.value);
        fill_if_missing(&mut base.authoritative_link, &other.authoritative_link);
        base.confidence = base.confidence.max(other.confidence);
    }

    let audit = ClusterAudit {
        ticker: base.ticker.clone(),
        subject_name: base.subject_name.clone(),
        base_source: base.source.clone(),
        member_sources,
        member_count,
    };
    if member_count > 1 {
        debug!(
            ticker = %audit.ticker,
            subject = %audit.subject_name,
            base_source = %audit.base_source,
            members = member_count,
            sources = ?audit.member_sources,
            "merged duplicate cluster"
        );
    }
    Some((ReconciledRecord::from_raw(base, member_count), audit))
}

/// Exact collapse, clustering and merge in one pass over a classified batch.
pub fn reconcile_fuzzy(records: Vec<RawTradeRecord>, config: FuzzyConfig) -> FuzzyOutcome {
    let (survivors, exact_duplicates) = collapse_exact(records);
    let mut outcome = FuzzyOutcome {
        exact_duplicates,
        ..FuzzyOutcome::default()
    };
    for members in cluster(survivors, config) {
        if let Some((record, audit)) = merge_cluster(members) {
            outcome.records.push(record);
            outcome.audits.push(audit);
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_record;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tdr_core::{Confidence, TransactionKind};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(source: &str, trade: Option<NaiveDate>, shares: f64, confidence: Confidence) -> RawTradeRecord {
        let mut r = RawTradeRecord::new("ACME", "Smith Jane", TransactionKind::Buy, source);
        r.trade_date = trade;
        r.shares = Some(shares);
        r.confidence = confidence;
        r.source_url = format!("https://{source}.example/ACME");
        r.fingerprint = fingerprint_record(&r);
        r
    }

    #[test]
    fn exact_collapse_keeps_highest_confidence_then_link_then_recency() {
        let mut low = rec("openinsider", Some(d(2025, 1, 1)), 100.0, Confidence::Low);
        let mut high = low.clone();
        high.confidence = Confidence::High;
        low.observed_at = Some(Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap());

        let (kept, dropped) = collapse_exact(vec![low.clone(), high.clone()]);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, Confidence::High);

        let mut older = low.clone();
        older.observed_at = Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        let (kept, _) = collapse_exact(vec![older, low.clone()]);
        assert_eq!(kept[0].observed_at, low.observed_at);

        let mut linked = low.clone();
        linked.authoritative_link =
            Some("https://www.sec.gov/Archives/edgar/data/1/2/3-index.html".into());
        let (kept, _) = collapse_exact(vec![low, linked.clone()]);
        assert_eq!(kept[0].authoritative_link, linked.authoritative_link);
    }

    #[test]
    fn cross_source_duplicates_merge_and_fill_gaps() {
        let mut low = rec("secform4", Some(d(2025, 3, 1)), 1000.0, Confidence::Low);
        low.value = Some(12_500.0);
        low.company_name = Some("Acme Corp".into());
        let mut med = rec("openinsider", Some(d(2025, 3, 2)), 995.0, Confidence::Medium);
        med.filing_date = Some(d(2025, 3, 3));
        med.fingerprint = fingerprint_record(&med);

        let outcome = reconcile_fuzzy(vec![low, med], FuzzyConfig::default());
        assert_eq!(outcome.records.len(), 1);
        let merged = &outcome.records[0];
        assert_eq!(merged.confidence, Confidence::Medium);
        assert_eq!(merged.source, "openinsider");
        assert_eq!(merged.source_url, "https://openinsider.example/ACME");
        assert_eq!(merged.trade_date, Some(d(2025, 3, 2)));
        assert_eq!(merged.value, Some(12_500.0));
        assert_eq!(merged.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(merged.member_count, 2);
        assert_eq!(outcome.audits[0].member_sources, vec!["openinsider", "secform4"]);
    }

    #[test]
    fn clustering_is_anchor_based_not_transitive() {
        let records = vec![
            rec("a", Some(d(2025, 5, 1)), 500.0, Confidence::Low),
            rec("b", Some(d(2025, 5, 2)), 500.0, Confidence::Low),
            rec("c", Some(d(2025, 5, 3)), 500.0, Confidence::Low),
        ];
        let clusters = cluster(records, FuzzyConfig::default());
        let sizes = clusters.iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(clusters[1][0].source, "c");
    }

    #[test]
    fn undated_records_only_cluster_with_each_other() {
        let records = vec![
            rec("a", None, 500.0, Confidence::Low),
            rec("b", Some(d(2025, 5, 2)), 500.0, Confidence::Low),
            rec("c", None, 500.0, Confidence::Medium),
        ];
        let clusters = cluster(records, FuzzyConfig::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 1);
        assert_eq!(clusters[0][0].source, "b");
        let undated = clusters[1].iter().map(|r| r.source.as_str()).collect::<Vec<_>>();
        assert_eq!(undated, vec!["c", "a"]);
    }

    #[test]
    fn share_buckets_separate_distinct_sizes() {
        assert_eq!(share_bucket(Some(995.0), 10), Some(1000));
        assert_eq!(share_bucket(Some(1004.0), 10), Some(1000));
        assert_eq!(share_bucket(Some(1006.0), 10), Some(1010));
        assert_eq!(share_bucket(None, 10), None);
        assert_eq!(share_bucket(Some(7.0), 0), Some(7));

        let records = vec![
            rec("a", Some(d(2025, 5, 1)), 1000.0, Confidence::Low),
            rec("b", Some(d(2025, 5, 1)), 2000.0, Confidence::Low),
        ];
        assert_eq!(cluster(records, FuzzyConfig::default()).len(), 2);
    }

    #[test]
    fn merged_confidence_is_never_below_any_member() {
        let members = vec![
            rec("a", Some(d(2025, 5, 1)), 10.0, Confidence::Low),
            rec("b", Some(d(2025, 5, 1)), 10.0, Confidence::High),
            rec("c", Some(d(2025, 5, 2)), 10.0, Confidence::Medium),
        ];
        let best = members.iter().map(|m| m.confidence).max().unwrap();
        let (merged, audit) = merge_cluster(members).unwrap();
        assert!(merged.confidence >= best);
        assert_eq!(audit.base_source, "b");
        assert!(merge_cluster(Vec::new()).is_none());
    }

    #[test]
    fn first_filler_wins() {
        let base = rec("base", Some(d(2025, 5, 1)), 10.0, Confidence::High);
        let mut second = rec("second", Some(d(2025, 5, 1)), 10.0, Confidence::Medium);
        second.price = Some(3.0);
        let mut third = rec("third", Some(d(2025, 5, 1)), 10.0, Confidence::Low);
        third.price = Some(4.0);
        let (merged, _) = merge_cluster(vec![third, base, second]).unwrap();
        assert_eq!(merged.price, Some(3.0));
        assert_eq!(merged.source, "base");
    }
}
