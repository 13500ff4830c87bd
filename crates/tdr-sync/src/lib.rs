//! Scan-run orchestration: load captured bundles, reconcile, export, report.

pub mod report;
pub mod roster;
pub mod settings;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tdr_adapters::{adapter_for_source, load_company_tickers, load_source_bundle, load_submissions};
use tdr_core::RawTradeRecord;
use tdr_reconcile::{reconcile, AuthorityTable, FilingIndex, ReconcileStats, TradeFilter};
use tdr_storage::ExportStore;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use report::{report_markdown, run_dir_name, summary_markdown, RunDigest};
pub use roster::LegislatorRoster;
pub use settings::{Settings, SourceConfig, SourceRegistry, SyncConfig};

pub const CRATE_NAME: &str = "tdr-sync";

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub parsed_records: usize,
    pub legislator_matches: usize,
    pub filtered_out: usize,
    pub rejected: usize,
    pub output_records: usize,
    pub stats: ReconcileStats,
    pub run_dir: String,
    pub manifest: String,
}

struct CollectedRecords {
    records: Vec<RawTradeRecord>,
    source_counts: BTreeMap<String, usize>,
    enabled_sources: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    settings: Settings,
    roster: LegislatorRoster,
    filter: TradeFilter,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let settings = Settings::load(&config.settings_path)?;
        let roster = LegislatorRoster::from_workspace_root(&config.workspace_root)?;
        Ok(Self {
            config,
            settings,
            roster,
            filter: TradeFilter::default(),
        })
    }

    /// Narrow the exported output. Reconciliation still sees every in-scope record.
    pub fn with_filter(mut self, filter: TradeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let registry = self.load_source_registry().await?;

        let collected = self.collect_records(&registry)?;
        let parsed_records = collected.records.len();
        let mut records = collected.records;
        let legislator_matches = self.roster.apply(&mut records);

        let window = self.config.window;
        let (records, outside): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| self.settings.in_scope(&r.ticker) && window.contains(r));
        let filtered_out = outside.len();

        let authority = self.load_authority()?;
        let filings = self.load_filing_index(&authority, &records)?;
        let report = reconcile(records, &authority, &filings, &self.settings.reconcile)
            .context("reconciling scan batch")?;
        let stats = report.stats;
        let output = self.filter.apply(report.records);

        let run_dir = self.config.output_dir.join(run_dir_name(started_at, run_id));
        let store = ExportStore::new(run_dir.clone());
        let manifest = store
            .export(&output, self.settings.export)
            .await
            .with_context(|| format!("exporting to {}", run_dir.display()))?;

        let rejected_json =
            serde_json::to_vec_pretty(&report.rejected).context("serializing rejected records")?;
        store
            .write_atomic(report::REJECTED_FILE, &rejected_json)
            .await
            .context("writing rejected.json")?;

        let finished_at = Utc::now();
        let summary = summary_markdown(&RunDigest {
            run_id,
            started_at,
            finished_at,
            records: &output,
            configured_tickers: &self.settings.tickers,
            source_counts: &collected.source_counts,
            filtered_out,
            stats,
        });
        store
            .write_atomic(report::SUMMARY_FILE, summary.as_bytes())
            .await
            .context("writing summary.md")?;

        info!(
            %run_id,
            sources = collected.enabled_sources,
            parsed = parsed_records,
            filtered_out,
            rejected = stats.rejected,
            output = output.len(),
            files = manifest.files.len(),
            "scan run complete"
        );

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            enabled_sources: collected.enabled_sources,
            parsed_records,
            legislator_matches,
            filtered_out,
            rejected: stats.rejected,
            output_records: output.len(),
            stats,
            run_dir: run_dir.display().to_string(),
            manifest: run_dir.join(tdr_storage::MANIFEST_FILE).display().to_string(),
        })
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.sources_path();
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn collect_records(&self, registry: &SourceRegistry) -> Result<CollectedRecords> {
        let mut records = Vec::new();
        let mut source_counts = BTreeMap::new();
        let mut enabled_sources = 0usize;

        for source in registry.enabled() {
            enabled_sources += 1;
            let adapter = adapter_for_source(&source.source_id)
                .with_context(|| format!("no adapter registered for {}", source.source_id))?;
            let bundle_path = source.bundle_path(&self.config.workspace_root);
            let bundle = load_source_bundle(&bundle_path)?;
            let parsed = adapter
                .parse_bundle(&bundle)
                .with_context(|| format!("parsing bundle {}", bundle_path.display()))?;
            info!(
                source = %source.source_id,
                bundle = %bundle.bundle_id,
                records = parsed.len(),
                "loaded source bundle"
            );
            source_counts.insert(source.source_id.clone(), parsed.len());
            records.extend(parsed);
        }

        Ok(CollectedRecords {
            records,
            source_counts,
            enabled_sources,
        })
    }

    /// A missing ticker snapshot degrades every record to unresolved instead of failing.
    fn load_authority(&self) -> Result<AuthorityTable> {
        let path = self.config.snapshots_dir().join("company_tickers.json");
        if !path.exists() {
            warn!(path = %path.display(), "no company tickers snapshot; all tickers unresolved");
            return Ok(AuthorityTable::new());
        }
        load_company_tickers(&path)
    }

    fn load_filing_index(
        &self,
        authority: &AuthorityTable,
        records: &[RawTradeRecord],
    ) -> Result<FilingIndex> {
        let registry_ids = records
            .iter()
            .filter_map(|r| authority.resolve(&r.ticker).registry_id)
            .collect::<BTreeSet<_>>();

        let dir = self.config.snapshots_dir().join("submissions");
        let mut index = FilingIndex::new();
        for registry_id in registry_ids {
            let path = dir.join(format!("CIK{registry_id}.json"));
            if !path.exists() {
                debug!(registry_id, "no submissions snapshot");
                continue;
            }
            index.insert(registry_id, load_submissions(&path)?);
        }
        debug!(registries = index.len(), "loaded filing index");
        Ok(index)
    }
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    run_sync_from_env(TradeFilter::default()).await
}

pub async fn run_sync_from_env(filter: TradeFilter) -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env()?;
    let pipeline = SyncPipeline::new(config)?.with_filter(filter);
    pipeline.run_once().await
}

pub fn report_from_env(runs: usize) -> Result<String> {
    let config = SyncConfig::from_env()?;
    report_markdown(runs, &config.output_dir)
}
