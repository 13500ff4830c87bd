//! Legislator roster: the one person-level lookup the pipeline does.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tdr_core::{RawTradeRecord, Role};
use tracing::debug;

const ROSTER_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
struct RosterFile {
    version: u32,
    #[serde(default)]
    legislators: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RosterEntry {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Lowercased alphanumeric tokens in sorted order, so "Roe, Pat" and "Pat Roe" agree.
pub fn normalize_person_name(name: &str) -> String {
    let mut tokens = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();
    tokens.sort();
    tokens.join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct LegislatorRoster {
    names: HashSet<String>,
}

impl LegislatorRoster {
    /// Reads `rules/legislators.yaml`; an absent file is an empty roster.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join("legislators.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).context("reading rules/legislators.yaml")?;
        Self::from_yaml_str(&text).context("parsing rules/legislators.yaml")
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: RosterFile = serde_yaml::from_str(text)?;
        if file.version != ROSTER_VERSION {
            bail!(
                "unsupported legislator roster version {} (expected {ROSTER_VERSION})",
                file.version
            );
        }
        let names = file
            .legislators
            .iter()
            .flat_map(|entry| std::iter::once(&entry.name).chain(entry.aliases.iter()))
            .map(|name| normalize_person_name(name))
            .filter(|name| !name.is_empty())
            .collect();
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, subject_name: &str) -> bool {
        self.names.contains(&normalize_person_name(subject_name))
    }

    /// Tag roster matches with [`Role::Legislator`]. Returns how many records were tagged.
    pub fn apply(&self, records: &mut [RawTradeRecord]) -> usize {
        if self.names.is_empty() {
            return 0;
        }
        let mut tagged = 0;
        for record in records.iter_mut() {
            if self.contains(&record.subject_name) {
                record.role = Some(Role::Legislator);
                tagged += 1;
            }
        }
        debug!(tagged, roster = self.names.len(), "applied legislator roster");
        tagged
    }
}
