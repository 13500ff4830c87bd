//! Atomic, content-hashed export of reconciled records.

pub mod encode;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tdr_core::ReconciledRecord;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use encode::{records_to_csv, records_to_json, records_to_parquet, EXPORT_COLUMNS};

pub const CRATE_NAME: &str = "tdr-storage";

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("arrow batch failed: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error("parquet encoding failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

fn io_error(context: String) -> impl FnOnce(std::io::Error) -> StoreError {
    move |source| StoreError::Io { context, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFormats {
    pub json: bool,
    pub csv: bool,
    pub parquet: bool,
}

impl Default for ExportFormats {
    fn default() -> Self {
        Self {
            json: true,
            csv: true,
            parquet: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub record_count: usize,
    pub files: Vec<ManifestFile>,
}

impl ManifestFile {
    fn from_stored(name: &str, stored: &StoredFile) -> Self {
        Self {
            name: name.to_string(),
            path: stored.relative_path.display().to_string(),
            sha256: stored.content_hash.clone(),
            bytes: stored.byte_size as u64,
        }
    }
}

/// Writes export files under one directory. Every write lands via temp file + rename,
/// so readers never observe a half-written export.
#[derive(Debug, Clone)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Replace `relative_path` with `bytes` atomically.
    pub async fn write_atomic(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> Result<StoredFile, StoreError> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .map_err(io_error(format!("creating export directory {}", parent.display())))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(io_error(format!("opening temp export file {}", temp_path.display())))?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(format!("writing temp export file {}", temp_path.display()))(err));
        }

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(format!(
                "atomically renaming temp export {} -> {}",
                temp_path.display(),
                absolute_path.display()
            ))(err));
        }

        Ok(StoredFile {
            content_hash: Self::sha256_hex(bytes),
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
        })
    }

    /// Write every enabled format plus `manifest.json` and return the manifest.
    pub async fn export(
        &self,
        records: &[ReconciledRecord],
        formats: ExportFormats,
    ) -> Result<ExportManifest, StoreError> {
        let span = info_span!("export", root = %self.root.display(), records = records.len());
        async move {
            let mut files = Vec::new();
            if formats.json {
                let stored = self.write_atomic("reconciled.json", &records_to_json(records)?).await?;
                files.push(ManifestFile::from_stored("reconciled_json", &stored));
            }
            if formats.csv {
                let stored = self.write_atomic("reconciled.csv", &records_to_csv(records)?).await?;
                files.push(ManifestFile::from_stored("reconciled_csv", &stored));
            }
            if formats.parquet {
                let stored = self
                    .write_atomic("reconciled.parquet", &records_to_parquet(records)?)
                    .await?;
                files.push(ManifestFile::from_stored("reconciled_parquet", &stored));
            }

            let manifest = ExportManifest {
                schema_version: 1,
                record_count: records.len(),
                files,
            };
            let bytes = serde_json::to_vec_pretty(&manifest)?;
            self.write_atomic(MANIFEST_FILE, &bytes).await?;
            info!(files = manifest.files.len(), "exported reconciled records");
            Ok(manifest)
        }
        .instrument(span)
        .await
    }
}
