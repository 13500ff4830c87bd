//! Ticker to registry-id resolution against an injected snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tdr_core::normalize_registry_id;

use crate::fingerprint::normalize_ticker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityEntry {
    pub registry_id: String,
    pub company_name: Option<String>,
}

/// Outcome of a lookup. Both halves may be absent independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution<'a> {
    pub registry_id: Option<&'a str>,
    pub company_name: Option<&'a str>,
}

impl Resolution<'_> {
    pub fn is_resolved(&self) -> bool {
        self.registry_id.is_some()
    }
}

/// Read-only ticker table, refreshed out-of-band and handed to each batch.
#[derive(Debug, Clone, Default)]
pub struct AuthorityTable {
    entries: HashMap<String, AuthorityEntry>,
}

impl AuthorityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a ticker. Blank tickers and registry ids are ignored.
    pub fn insert(
        &mut self,
        ticker: &str,
        registry_id: &str,
        company_name: Option<String>,
    ) -> bool {
        let ticker = normalize_ticker(ticker);
        let Some(registry_id) = normalize_registry_id(registry_id) else {
            return false;
        };
        if ticker.is_empty() {
            return false;
        }
        let company_name = company_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.entries.insert(
            ticker,
            AuthorityEntry {
                registry_id,
                company_name,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, ticker: &str) -> Resolution<'_> {
        match self.entries.get(&normalize_ticker(ticker)) {
            Some(entry) => Resolution {
                registry_id: Some(entry.registry_id.as_str()),
                company_name: entry.company_name.as_deref(),
            },
            None => Resolution::default(),
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str, Option<String>)> for AuthorityTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str, Option<String>)>>(iter: I) -> Self {
        let mut table = AuthorityTable::new();
        for (ticker, registry_id, company_name) in iter {
            table.insert(ticker, registry_id, company_name);
        }
        table
    }
}
