//! Confidence tiers from link provenance and filing-date proximity.

use chrono::NaiveDate;
use serde::Serialize;
use tdr_core::{links, Confidence, FilingReference, RawTradeRecord};

/// Which rule produced a classification, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassificationRule {
    ArchiveLink,
    Unresolved,
    CloseMatch,
    DistantMatch,
    NoFiling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub confidence: Confidence,
    pub authoritative_link: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub rule: ClassificationRule,
}

impl Classification {
    pub fn apply_to(self, record: &mut RawTradeRecord) {
        record.confidence = self.confidence;
        record.authoritative_link = self.authoritative_link;
        record.filing_date = self.filing_date;
    }
}

/// Classify a record. The first matching rule wins:
///
/// 1. link already in the regulator archive: HIGH, untouched
/// 2. no registry id: LOW, link replaced by a generic verification search
/// 3. matched filing within `tolerance_days` of the record's filing (or trade) date: HIGH
/// 4. matched filing further away, or undated on either side: MEDIUM
/// 5. registry known but no qualifying filing: LOW, link to the registry landing page
///
/// Rules 3 and 4 point the link at the filing index and backfill a missing filing date.
/// That index link is an archive link, so a rule 4 record classified again lands on
/// rule 1 and becomes HIGH. It is stable from then on.
pub fn classify(
    record: &RawTradeRecord,
    registry_id: Option<&str>,
    matched: Option<&FilingReference>,
    tolerance_days: i64,
) -> Classification {
    if record.has_archive_link() {
        return Classification {
            confidence: Confidence::High,
            authoritative_link: record.authoritative_link.clone(),
            filing_date: record.filing_date,
            rule: ClassificationRule::ArchiveLink,
        };
    }

    let Some(registry_id) = registry_id else {
        return Classification {
            confidence: Confidence::Low,
            authoritative_link: Some(links::verification_search_url(
                &record.subject_name,
                &record.ticker,
                record.filing_date.or(record.trade_date),
            )),
            filing_date: record.filing_date,
            rule: ClassificationRule::Unresolved,
        };
    };

    let Some(filing) = matched else {
        return Classification {
            confidence: Confidence::Low,
            authoritative_link: Some(links::registry_landing_url(registry_id)),
            filing_date: record.filing_date,
            rule: ClassificationRule::NoFiling,
        };
    };

    let reference_date = record.filing_date.or(record.trade_date);
    let distance = match (reference_date, filing.filing_date) {
        (Some(r), Some(f)) => Some((f - r).num_days().abs()),
        _ => None,
    };
    let (confidence, rule) = match distance {
        Some(days) if days <= tolerance_days => (Confidence::High, ClassificationRule::CloseMatch),
        _ => (Confidence::Medium, ClassificationRule::DistantMatch),
    };

    Classification {
        confidence,
        authoritative_link: Some(filing.index_url()),
        filing_date: record.filing_date.or(filing.filing_date),
        rule,
    }
}
