//! Known event tables
//!
//! The metadata service (blueprint) lists every event the pipeline knows
//! about as a JSON array of objects with an `EventName` field. Each event
//! name is also the name of its live table.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::error::{ReplayError, Result};

/// Default timeout for metadata requests
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the full table set
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Every known table, sorted and without duplicates
    async fn tables(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct BlueprintEvent {
    #[serde(rename = "EventName")]
    event_name: String,
}

/// HTTP client for the blueprint metadata service
#[derive(Debug, Clone)]
pub struct BlueprintCatalog {
    client: Client,
    url: url::Url,
}

impl BlueprintCatalog {
    /// Create a client for `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = url::Url::parse(url)
            .map_err(|e| ReplayError::config(format!("invalid blueprint url '{}': {}", url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReplayError::catalog_with_source("failed to build HTTP client", e))?;
        Ok(Self { client, url })
    }

    /// Service URL
    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

#[async_trait]
impl TableCatalog for BlueprintCatalog {
    async fn tables(&self) -> Result<Vec<String>> {
        debug!("Fetching table list from {}", self.url);
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| ReplayError::catalog_with_source("blueprint request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReplayError::catalog(format!(
                "blueprint returned {}: {}",
                status, body
            )));
        }

        let events: Vec<BlueprintEvent> = response
            .json()
            .await
            .map_err(|e| ReplayError::catalog_with_source("invalid blueprint response", e))?;
        Ok(distinct_sorted(events.into_iter().map(|e| e.event_name)))
    }
}

/// Fixed table list
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: Vec<String>,
}

impl StaticCatalog {
    /// Create a catalog over `tables`
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: distinct_sorted(tables.into_iter().map(Into::into)),
        }
    }
}

#[async_trait]
impl TableCatalog for StaticCatalog {
    async fn tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.clone())
    }
}

fn distinct_sorted(names: impl Iterator<Item = String>) -> Vec<String> {
    names
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
