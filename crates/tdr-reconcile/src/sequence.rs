//! Final duplicate collapse and deterministic ordering of reconciled output.

use std::cmp::Ordering;
use std::collections::HashMap;

use tdr_core::{is_present, links, ReconciledRecord};

use crate::fingerprint::fingerprint_reconciled;

fn descending_nulls_last<T, F>(a: Option<T>, b: Option<T>, cmp: F) -> Ordering
where
    F: Fn(&T, &T) -> Ordering,
{
    match (a, b) {
        (Some(x), Some(y)) => cmp(&y, &x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Trade date descending, then value descending, both with missing values last.
/// Fingerprint ascending makes the order total.
pub fn canonical_order(a: &ReconciledRecord, b: &ReconciledRecord) -> Ordering {
    let value = |r: &ReconciledRecord| if is_present(&r.value) { r.value } else { None };
    descending_nulls_last(a.trade_date, b.trade_date, Ord::cmp)
        .then_with(|| descending_nulls_last(value(a), value(b), f64::total_cmp))
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
}

fn outranks(candidate: &ReconciledRecord, current: &ReconciledRecord) -> bool {
    let rank = |r: &ReconciledRecord| {
        (
            r.confidence,
            r.authoritative_link.as_deref().is_some_and(links::is_archive_link),
        )
    };
    rank(candidate) > rank(current)
}

/// Recompute fingerprints, collapse records that converged on the same one, and sort.
pub fn finalize(records: Vec<ReconciledRecord>) -> Vec<ReconciledRecord> {
    let mut out: Vec<ReconciledRecord> = Vec::with_capacity(records.len());
    let mut by_fingerprint: HashMap<String, usize> = HashMap::new();

    for mut record in records {
        record.fingerprint = fingerprint_reconciled(&record);
        match by_fingerprint.get(&record.fingerprint) {
            Some(&slot) => {
                let absorbed = out[slot].member_count;
                if outranks(&record, &out[slot]) {
                    record.member_count += absorbed;
                    out[slot] = record;
                } else {
                    out[slot].member_count += record.member_count;
                }
            }
            None => {
                by_fingerprint.insert(record.fingerprint.clone(), out.len());
                out.push(record);
            }
        }
    }

    out.sort_by(canonical_order);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tdr_core::{Confidence, RawTradeRecord, TransactionKind};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn out(subject: &str, trade: Option<NaiveDate>, value: Option<f64>) -> ReconciledRecord {
        let mut r = RawTradeRecord::new("ACME", subject, TransactionKind::Sell, "secform4");
        r.trade_date = trade;
        r.value = value;
        ReconciledRecord::from_raw(r, 1)
    }

    #[test]
    fn orders_by_date_then_value_with_nulls_last() {
        let records = vec![
            out("a", Some(d(2025, 5, 1)), Some(100.0)),
            out("b", None, Some(50.0)),
            out("c", Some(d(2025, 5, 2)), Some(200.0)),
        ];
        let sorted = finalize(records);
        let subjects = sorted.iter().map(|r| r.subject_name.as_str()).collect::<Vec<_>>();
        assert_eq!(subjects, vec!["c", "a", "b"]);
    }

    #[test]
    fn missing_values_sort_after_present_ones_on_the_same_day() {
        let records = vec![
            out("none", Some(d(2025, 5, 1)), None),
            out("nan", Some(d(2025, 5, 1)), Some(f64::NAN)),
            out("small", Some(d(2025, 5, 1)), Some(1.0)),
            out("big", Some(d(2025, 5, 1)), Some(9.0)),
        ];
        let sorted = finalize(records);
        assert_eq!(sorted[0].subject_name, "big");
        assert_eq!(sorted[1].subject_name, "small");
    }

    #[test]
    fn converged_records_collapse_and_keep_member_counts() {
        let mut weak = out("same", Some(d(2025, 5, 1)), Some(10.0));
        weak.member_count = 2;
        let mut strong = weak.clone();
        strong.confidence = Confidence::High;
        strong.member_count = 3;

        let sorted = finalize(vec![weak, strong]);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].confidence, Confidence::High);
        assert_eq!(sorted[0].member_count, 5);
        assert_eq!(sorted[0].fingerprint.len(), 64);
    }

    #[test]
    fn ordering_is_reproducible_regardless_of_input_order() {
        let a = out("a", Some(d(2025, 5, 1)), Some(10.0));
        let b = out("b", Some(d(2025, 5, 1)), Some(10.0));
        let first = finalize(vec![a.clone(), b.clone()]);
        let second = finalize(vec![b, a]);
        assert_eq!(first, second);
    }
}
