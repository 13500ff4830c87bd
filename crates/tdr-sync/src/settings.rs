//! Environment config, `tdr.yaml` settings and the `sources.yaml` registry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tdr_reconcile::{DateWindow, ReconcileOptions};
use tdr_storage::ExportFormats;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Bundle path relative to the workspace root.
    #[serde(default)]
    pub bundle: Option<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceConfig {
    pub fn bundle_path(&self, workspace_root: &Path) -> PathBuf {
        match &self.bundle {
            Some(rel) => workspace_root.join(rel),
            None => workspace_root
                .join("fixtures")
                .join(&self.source_id)
                .join("bundle.json"),
        }
    }
}

impl SourceRegistry {
    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tickers: Vec<String>,
    pub reconcile: ReconcileOptions,
    pub export: ExportFormats,
}

impl Settings {
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut settings: Settings =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        settings.tickers = settings
            .tickers
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        settings
            .reconcile
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(settings)
    }

    /// An empty ticker list means every ticker is in scope.
    pub fn in_scope(&self, ticker: &str) -> bool {
        self.tickers.is_empty() || self.tickers.iter().any(|t| t.eq_ignore_ascii_case(ticker.trim()))
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub output_dir: PathBuf,
    pub settings_path: PathBuf,
    pub window: DateWindow,
}

fn parse_window_date(name: &str, value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .with_context(|| format!("{name} must be YYYY-MM-DD, got {v:?}"))
        })
        .transpose()
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let workspace_root = get("TDR_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let output_dir = get("TDR_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("outputs"));
        let settings_path = get("TDR_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("tdr.yaml"));
        let window = DateWindow {
            start: parse_window_date("TDR_START_DATE", get("TDR_START_DATE"))?,
            end: parse_window_date("TDR_END_DATE", get("TDR_END_DATE"))?,
        };
        Ok(Self {
            workspace_root,
            output_dir,
            settings_path,
            window,
        })
    }

    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let workspace_root = root.into();
        Self {
            output_dir: workspace_root.join("outputs"),
            settings_path: workspace_root.join("tdr.yaml"),
            workspace_root,
            window: DateWindow::default(),
        }
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.workspace_root.join("snapshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_hang_off_the_workspace_root() {
        let config = SyncConfig::from_vars(vars(&[("TDR_WORKSPACE_ROOT", "/data/tdr")])).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/data/tdr/outputs"));
        assert_eq!(config.settings_path, PathBuf::from("/data/tdr/tdr.yaml"));
        assert_eq!(config.window, DateWindow::default());
    }

    #[test]
    fn window_dates_are_parsed_and_validated() {
        let config = SyncConfig::from_vars(vars(&[
            ("TDR_START_DATE", "2025-01-01"),
            ("TDR_END_DATE", " "),
        ]))
        .unwrap();
        assert_eq!(config.window.start, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(config.window.end, None);

        let err = SyncConfig::from_vars(vars(&[("TDR_END_DATE", "01/31/2025")])).unwrap_err();
        assert!(err.to_string().contains("TDR_END_DATE"));
    }

    #[test]
    fn settings_yaml_is_partial_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdr.yaml");
        std::fs::write(
            &path,
            "tickers: [' acme', '', zeno]\nreconcile:\n  tolerance_days: 3\nexport:\n  parquet: false\n",
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.tickers, vec!["ACME", "ZENO"]);
        assert_eq!(settings.reconcile.tolerance_days, 3);
        assert_eq!(settings.reconcile.share_bucket_size, 10);
        assert!(settings.export.json && !settings.export.parquet);
        assert!(settings.in_scope("zeno"));
        assert!(!settings.in_scope("QQQX"));
    }

    #[test]
    fn missing_settings_file_means_defaults() {
        let settings = Settings::load("/definitely/not/here/tdr.yaml").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.in_scope("ANY"));
    }

    #[test]
    fn invalid_reconcile_options_fail_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdr.yaml");
        std::fs::write(&path, "reconcile:\n  share_bucket_size: 0\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("share_bucket_size"));
    }
}
