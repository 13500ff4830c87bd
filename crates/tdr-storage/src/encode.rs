//! Encoders for reconciled records. Column names match the record's serde field names.

use std::sync::Arc;

use arrow_array::{ArrayRef, Date32Array, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{Datelike, NaiveDate};
use parquet::arrow::ArrowWriter;
use tdr_core::ReconciledRecord;

use crate::StoreError;

pub const EXPORT_COLUMNS: &[&str] = &[
    "ticker",
    "company_name",
    "subject_name",
    "role",
    "transaction_kind",
    "trade_date",
    "filing_date",
    "shares",
    "price",
    "value",
    "authoritative_link",
    "source",
    "source_url",
    "confidence",
    "fingerprint",
    "member_count",
];

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn records_to_json(records: &[ReconciledRecord]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec_pretty(records)?)
}

/// One header row, then one row per record. Absent values are empty cells.
pub fn records_to_csv(records: &[ReconciledRecord]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(EXPORT_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|e| StoreError::Io {
        context: "flushing csv buffer".to_string(),
        source: e.into_error(),
    })
}

fn export_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        ArrowField::new("ticker", DataType::Utf8, false),
        ArrowField::new("company_name", DataType::Utf8, true),
        ArrowField::new("subject_name", DataType::Utf8, false),
        ArrowField::new("role", DataType::Utf8, true),
        ArrowField::new("transaction_kind", DataType::Utf8, false),
        ArrowField::new("trade_date", DataType::Date32, true),
        ArrowField::new("filing_date", DataType::Date32, true),
        ArrowField::new("shares", DataType::Float64, true),
        ArrowField::new("price", DataType::Float64, true),
        ArrowField::new("value", DataType::Float64, true),
        ArrowField::new("authoritative_link", DataType::Utf8, true),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("source_url", DataType::Utf8, false),
        ArrowField::new("confidence", DataType::Utf8, false),
        ArrowField::new("fingerprint", DataType::Utf8, false),
        ArrowField::new("member_count", DataType::UInt32, false),
    ]))
}

fn utf8<'a>(records: &'a [ReconciledRecord], f: impl Fn(&'a ReconciledRecord) -> Option<&'a str>) -> ArrayRef {
    Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
}

fn float(records: &[ReconciledRecord], f: impl Fn(&ReconciledRecord) -> Option<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(records.iter().map(f).collect::<Vec<_>>()))
}

fn date(records: &[ReconciledRecord], f: impl Fn(&ReconciledRecord) -> Option<NaiveDate>) -> ArrayRef {
    Arc::new(Date32Array::from(
        records.iter().map(|r| f(r).map(epoch_days)).collect::<Vec<_>>(),
    ))
}

pub fn records_to_parquet(records: &[ReconciledRecord]) -> Result<Vec<u8>, StoreError> {
    let schema = export_schema();
    let member_counts = records
        .iter()
        .map(|r| u32::try_from(r.member_count).unwrap_or(u32::MAX))
        .collect::<Vec<_>>();
    let columns: Vec<ArrayRef> = vec![
        utf8(records, |r| Some(r.ticker.as_str())),
        utf8(records, |r| r.company_name.as_deref()),
        utf8(records, |r| Some(r.subject_name.as_str())),
        utf8(records, |r| r.role.map(|role| role.as_str())),
        utf8(records, |r| Some(r.transaction_kind.as_str())),
        date(records, |r| r.trade_date),
        date(records, |r| r.filing_date),
        float(records, |r| r.shares),
        float(records, |r| r.price),
        float(records, |r| r.value),
        utf8(records, |r| r.authoritative_link.as_deref()),
        utf8(records, |r| Some(r.source.as_str())),
        utf8(records, |r| Some(r.source_url.as_str())),
        utf8(records, |r| Some(r.confidence.as_str())),
        utf8(records, |r| Some(r.fingerprint.as_str())),
        Arc::new(UInt32Array::from(member_counts)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut writer = ArrowWriter::try_new(Vec::new(), schema, None)?;
    writer.write(&batch)?;
    Ok(writer.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdr_core::{Confidence, TransactionKind};

    fn record() -> ReconciledRecord {
        ReconciledRecord {
            ticker: "ACME".into(),
            company_name: Some("Acme, Corp".into()),
            subject_name: "Smith Jane".into(),
            role: None,
            transaction_kind: TransactionKind::Buy,
            trade_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            filing_date: None,
            shares: Some(1000.0),
            price: Some(12.5),
            value: None,
            authoritative_link: None,
            source: "openinsider".into(),
            source_url: "http://openinsider.example".into(),
            confidence: Confidence::Medium,
            fingerprint: "abc".into(),
            member_count: 2,
        }
    }

    #[test]
    fn epoch_day_arithmetic() {
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(epoch_days(NaiveDate::from_ymd_opt(1970, 1, 31).unwrap()), 30);
    }

    #[test]
    fn csv_uses_stable_headers_and_quotes_commas() {
        let bytes = records_to_csv(&[record()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), EXPORT_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("ACME,\"Acme, Corp\",Smith Jane,,Buy,2025-03-01,,1000.0,12.5,,,"), "{row}");
        assert!(row.ends_with(",MED,abc,2"), "{row}");
    }

    #[test]
    fn empty_csv_still_has_a_header() {
        let text = String::from_utf8(records_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(","));
    }

    #[test]
    fn parquet_schema_matches_export_columns() {
        let names = export_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>();
        assert_eq!(names, EXPORT_COLUMNS);
        let bytes = records_to_parquet(&[record()]).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
    }
}
