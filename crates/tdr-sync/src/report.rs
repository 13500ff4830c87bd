//! Markdown run summaries and the cross-run report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tdr_core::ReconciledRecord;
use tdr_reconcile::ReconcileStats;
use tdr_storage::{ExportManifest, MANIFEST_FILE};
use uuid::Uuid;

pub const SUMMARY_FILE: &str = "summary.md";
pub const REJECTED_FILE: &str = "rejected.json";

/// Everything `summary.md` says about one run.
#[derive(Debug, Clone)]
pub struct RunDigest<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: &'a [ReconciledRecord],
    pub configured_tickers: &'a [String],
    pub source_counts: &'a BTreeMap<String, usize>,
    pub filtered_out: usize,
    pub stats: ReconcileStats,
}

pub fn summary_markdown(digest: &RunDigest<'_>) -> String {
    let records = digest.records;
    let dates = records.iter().filter_map(|r| r.trade_date);
    let range = match (dates.clone().min(), dates.max()) {
        (Some(first), Some(last)) => format!("{first} .. {last}"),
        _ => "n/a".to_string(),
    };
    let tickers = records
        .iter()
        .map(|r| r.ticker.as_str())
        .collect::<BTreeSet<_>>();
    let no_data = digest
        .configured_tickers
        .iter()
        .filter(|t| !tickers.contains(t.as_str()))
        .map(String::as_str)
        .collect::<Vec<_>>();
    let mut confidence_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *confidence_counts.entry(record.confidence.as_str()).or_default() += 1;
    }

    let join_or_none = |items: Vec<&str>| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };

    let mut lines = vec![
        "# TDR Run Summary".to_string(),
        String::new(),
        format!("- Run ID: `{}`", digest.run_id),
        format!("- Started: {}", digest.started_at),
        format!("- Finished: {}", digest.finished_at),
        format!("- Rows: {}", records.len()),
        format!("- Trade dates: {range}"),
        format!("- Tickers: {}", join_or_none(tickers.into_iter().collect())),
        format!("- Tickers with no data: {}", join_or_none(no_data)),
        format!("- Outside scan window: {}", digest.filtered_out),
        format!("- Rejected: {}", digest.stats.rejected),
        format!("- Unresolved tickers: {}", digest.stats.unresolved_tickers),
        format!(
            "- Merged duplicates: {} exact, {} fuzzy",
            digest.stats.exact_duplicates, digest.stats.merged_members
        ),
        String::new(),
        "## Source Counts".to_string(),
    ];
    lines.extend(
        digest
            .source_counts
            .iter()
            .map(|(source, count)| format!("- {source}: {count}")),
    );
    lines.push(String::new());
    lines.push("## Confidence".to_string());
    lines.extend(
        confidence_counts
            .iter()
            .map(|(label, count)| format!("- {label}: {count}")),
    );
    lines.push(String::new());
    lines.join("\n")
}

/// Directory name for a run; sorts chronologically.
pub fn run_dir_name(started_at: DateTime<Utc>, run_id: Uuid) -> String {
    format!("{}-{}", started_at.format("%Y%m%dT%H%M%S%3fZ"), run_id.simple())
}

/// List the newest `runs` run directories under `output_dir`.
pub fn report_markdown(runs: usize, output_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(output_dir)
        .with_context(|| format!("reading {}", output_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.file_name());
    dirs.reverse();

    let mut lines = vec!["# TDR Report".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let name = dir.file_name().to_string_lossy().to_string();
        let manifest_path = dir.path().join(MANIFEST_FILE);
        let summary_path = dir.path().join(SUMMARY_FILE);

        lines.push(format!("## Run `{name}`"));
        if manifest_path.exists() {
            let manifest: ExportManifest = serde_json::from_str(
                &std::fs::read_to_string(&manifest_path)
                    .with_context(|| format!("reading {}", manifest_path.display()))?,
            )
            .with_context(|| format!("parsing {}", manifest_path.display()))?;
            lines.push(format!("- records: {}", manifest.record_count));
            for file in &manifest.files {
                lines.push(format!("- {}: `{}` ({} bytes)", file.name, file.path, file.bytes));
            }
        } else {
            lines.push("- no export manifest".to_string());
        }
        if summary_path.exists() {
            lines.push(format!("- summary: `{}`", summary_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
