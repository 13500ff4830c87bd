//! Parsers for regulator snapshots: the ticker table and per-company filing lists.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use tdr_core::{normalize_registry_id, FilingReference};
use tdr_reconcile::AuthorityTable;
use tracing::debug;

use crate::cells::parse_date_cell;
use crate::AdapterError;

fn registry_id_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => n.as_u64().map(|v| v.to_string()),
        JsonValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Build an authority table from `company_tickers.json`.
///
/// Accepts the raw numeric-keyed download (`{"0": {"cik_str": .., "ticker": .., "title": ..}}`)
/// and the processed ticker-keyed form. Entries without a ticker or registry id are skipped.
pub fn parse_company_tickers(value: &JsonValue) -> Result<AuthorityTable, AdapterError> {
    let JsonValue::Object(map) = value else {
        return Err(AdapterError::Message(
            "company tickers snapshot must be a JSON object".to_string(),
        ));
    };

    let mut table = AuthorityTable::new();
    let mut skipped = 0usize;
    for (key, entry) in map {
        let ticker = entry
            .get("ticker")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .or_else(|| (!key.chars().all(|c| c.is_ascii_digit())).then(|| key.clone()))
            .unwrap_or_default();
        let registry_id = entry
            .get("cik_str")
            .or_else(|| entry.get("cik"))
            .and_then(registry_id_value)
            .unwrap_or_default();
        let title = entry
            .get("title")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        if !table.insert(&ticker, &registry_id, title) {
            skipped += 1;
        }
    }
    debug!(entries = table.len(), skipped, "parsed company tickers snapshot");
    Ok(table)
}

pub fn load_company_tickers(path: impl AsRef<Path>) -> Result<AuthorityTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: JsonValue =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    parse_company_tickers(&value).with_context(|| format!("loading {}", path.display()))
}

fn column<'a>(recent: Option<&'a JsonValue>, name: &str) -> &'a [JsonValue] {
    recent
        .and_then(|r| r.get(name))
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn cell_str(column: &[JsonValue], index: usize) -> Option<&str> {
    column
        .get(index)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read the columnar `filings.recent` arrays of a submissions document.
///
/// `fallback_registry_id` is used when the document has no `cik` field.
pub fn parse_submissions(
    value: &JsonValue,
    fallback_registry_id: Option<&str>,
) -> Result<Vec<FilingReference>, AdapterError> {
    let registry_id = value
        .get("cik")
        .and_then(registry_id_value)
        .or_else(|| fallback_registry_id.map(str::to_string))
        .and_then(|id| normalize_registry_id(&id))
        .ok_or_else(|| AdapterError::Message("submissions snapshot has no registry id".to_string()))?;

    let recent = value.get("filings").and_then(|f| f.get("recent"));
    let forms = column(recent, "form");
    let dates = column(recent, "filingDate");
    let accessions = column(recent, "accessionNumber");
    let documents = column(recent, "primaryDocument");

    let rows = forms.len().min(accessions.len());
    let mut out = Vec::with_capacity(rows);
    for i in 0..rows {
        let (Some(form), Some(accession)) = (cell_str(forms, i), cell_str(accessions, i)) else {
            continue;
        };
        out.push(FilingReference {
            registry_id: registry_id.clone(),
            filing_accession_id: accession.to_string(),
            filing_date: cell_str(dates, i).and_then(parse_date_cell),
            filing_form_type: form.to_string(),
            primary_document: cell_str(documents, i).map(str::to_string),
        });
    }
    Ok(out)
}

pub fn load_submissions(path: impl AsRef<Path>) -> Result<Vec<FilingReference>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: JsonValue =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let stem_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("CIK"));
    parse_submissions(&value, stem_id).with_context(|| format!("loading {}", path.display()))
}
