//! Nearest-filing search under date uncertainty.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::NaiveDate;
use tdr_core::FilingReference;

/// Read-only source of per-registry filing lists, fetched ahead of the batch.
pub trait FilingLookup {
    fn filings_for(&self, registry_id: &str) -> Cow<'_, [FilingReference]>;
}

impl<F> FilingLookup for F
where
    F: Fn(&str) -> Vec<FilingReference>,
{
    fn filings_for(&self, registry_id: &str) -> Cow<'_, [FilingReference]> {
        Cow::Owned(self(registry_id))
    }
}

/// In-memory snapshot of filing lists keyed by registry id.
#[derive(Debug, Clone, Default)]
pub struct FilingIndex {
    by_registry: HashMap<String, Vec<FilingReference>>,
}

impl FilingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, registry_id: impl Into<String>, filings: Vec<FilingReference>) {
        self.by_registry.insert(registry_id.into(), filings);
    }

    pub fn contains(&self, registry_id: &str) -> bool {
        self.by_registry.contains_key(registry_id)
    }

    pub fn len(&self) -> usize {
        self.by_registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_registry.is_empty()
    }
}

impl FilingLookup for FilingIndex {
    fn filings_for(&self, registry_id: &str) -> Cow<'_, [FilingReference]> {
        match self.by_registry.get(registry_id) {
            Some(filings) => Cow::Borrowed(filings.as_slice()),
            None => Cow::Borrowed(&[]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingMatch {
    pub filing: FilingReference,
    /// Days between the filing and the preference date; `None` when either side is undated.
    pub distance_days: Option<i64>,
    pub within_tolerance: bool,
}

fn qualifies(filing: &FilingReference, qualifying_form_types: &[String]) -> bool {
    qualifying_form_types.is_empty()
        || qualifying_form_types
            .iter()
            .any(|form| form.trim().eq_ignore_ascii_case(filing.filing_form_type.trim()))
}

/// Best qualifying filing in `filings`, scored by day distance to `hint_date` (or `target_date`).
///
/// Always returns the best candidate, even outside `max_tolerance_days`; the flag on the
/// match records whether it was inside. Equal distances prefer the later filing, and
/// undated filings only win when nothing dated qualifies.
pub fn nearest_filing(
    filings: &[FilingReference],
    target_date: Option<NaiveDate>,
    hint_date: Option<NaiveDate>,
    qualifying_form_types: &[String],
    max_tolerance_days: i64,
) -> Option<FilingMatch> {
    let preference = hint_date.or(target_date);
    let distance = |filing: &FilingReference| -> Option<i64> {
        match (preference, filing.filing_date) {
            (Some(p), Some(f)) => Some((f - p).num_days().abs()),
            _ => None,
        }
    };

    let best = filings
        .iter()
        .filter(|f| qualifies(f, qualifying_form_types))
        .min_by_key(|f| {
            let d = distance(*f);
            (d.is_none(), d.unwrap_or(i64::MAX), Reverse(f.filing_date))
        })?;

    let distance_days = distance(best);
    Some(FilingMatch {
        filing: best.clone(),
        distance_days,
        within_tolerance: distance_days.is_some_and(|d| d <= max_tolerance_days),
    })
}

pub fn find_nearest_filing<L: FilingLookup + ?Sized>(
    lookup: &L,
    registry_id: &str,
    target_date: Option<NaiveDate>,
    hint_date: Option<NaiveDate>,
    qualifying_form_types: &[String],
    max_tolerance_days: i64,
) -> Option<FilingMatch> {
    let filings = lookup.filings_for(registry_id);
    nearest_filing(
        &filings,
        target_date,
        hint_date,
        qualifying_form_types,
        max_tolerance_days,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn filing(accession: &str, date: Option<NaiveDate>, form: &str) -> FilingReference {
        FilingReference {
            registry_id: "0000000042".into(),
            filing_accession_id: accession.into(),
            filing_date: date,
            filing_form_type: form.into(),
            primary_document: None,
        }
    }

    fn forms() -> Vec<String> {
        vec!["4".to_string(), "4/A".to_string()]
    }

    #[test]
    fn equidistant_candidates_prefer_the_later_filing() {
        let filings = vec![
            filing("early", Some(d(2025, 6, 8)), "4"),
            filing("late", Some(d(2025, 6, 12)), "4"),
        ];
        let hit = nearest_filing(&filings, Some(d(2025, 6, 10)), None, &forms(), 2).unwrap();
        assert_eq!(hit.filing.filing_accession_id, "late");
        assert_eq!(hit.distance_days, Some(2));
        assert!(hit.within_tolerance);
    }

    #[test]
    fn hint_date_takes_precedence_over_target() {
        let filings = vec![
            filing("near-trade", Some(d(2025, 1, 2)), "4"),
            filing("near-hint", Some(d(2025, 1, 20)), "4"),
        ];
        let hit = nearest_filing(&filings, Some(d(2025, 1, 1)), Some(d(2025, 1, 21)), &forms(), 2)
            .unwrap();
        assert_eq!(hit.filing.filing_accession_id, "near-hint");
    }

    #[test]
    fn out_of_tolerance_match_is_still_returned() {
        let filings = vec![filing("far", Some(d(2025, 3, 1)), "4")];
        let hit = nearest_filing(&filings, Some(d(2025, 1, 1)), None, &forms(), 2).unwrap();
        assert_eq!(hit.distance_days, Some(59));
        assert!(!hit.within_tolerance);
    }

    #[test]
    fn non_qualifying_forms_are_filtered_out() {
        let filings = vec![
            filing("annual", Some(d(2025, 1, 1)), "10-K"),
            filing("amended", Some(d(2025, 1, 9)), "4/a"),
        ];
        let hit = nearest_filing(&filings, Some(d(2025, 1, 1)), None, &forms(), 2).unwrap();
        assert_eq!(hit.filing.filing_accession_id, "amended");

        let only_annual = vec![filing("annual", Some(d(2025, 1, 1)), "10-K")];
        assert!(nearest_filing(&only_annual, Some(d(2025, 1, 1)), None, &forms(), 2).is_none());
    }

    #[test]
    fn undated_candidate_is_a_last_resort() {
        let filings = vec![
            filing("undated", None, "4"),
            filing("dated", Some(d(2024, 1, 1)), "4"),
        ];
        let hit = nearest_filing(&filings, Some(d(2025, 1, 1)), None, &forms(), 2).unwrap();
        assert_eq!(hit.filing.filing_accession_id, "dated");

        let undated_only = vec![filing("undated", None, "4")];
        let hit = nearest_filing(&undated_only, Some(d(2025, 1, 1)), None, &forms(), 2).unwrap();
        assert_eq!(hit.filing.filing_accession_id, "undated");
        assert_eq!(hit.distance_days, None);
        assert!(!hit.within_tolerance);
    }

    #[test]
    fn lookup_works_for_index_and_closure() {
        let mut index = FilingIndex::new();
        index.insert("0000000042", vec![filing("a", Some(d(2025, 2, 2)), "4")]);
        let hit = find_nearest_filing(&index, "0000000042", Some(d(2025, 2, 1)), None, &forms(), 2);
        assert!(hit.is_some());
        assert!(find_nearest_filing(&index, "0000000099", Some(d(2025, 2, 1)), None, &forms(), 2).is_none());

        let closure = |registry_id: &str| -> Vec<FilingReference> {
            if registry_id == "0000000042" {
                vec![filing("b", Some(d(2025, 2, 3)), "4")]
            } else {
                Vec::new()
            }
        };
        let hit = find_nearest_filing(&closure, "0000000042", Some(d(2025, 2, 1)), None, &forms(), 2)
            .unwrap();
        assert_eq!(hit.filing.filing_accession_id, "b");
    }
}
