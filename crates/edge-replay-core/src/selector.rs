//! Selection of raw edge objects for a replay window

use edge_replay_storage::{ObjectKey, ObjectStorage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::{ReplayError, Result};
use crate::window::ReplayWindow;

/// Lists the source bucket under the window's day prefixes
pub struct ObjectSelector {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    span: Span,
}

impl ObjectSelector {
    /// Create a selector over `bucket`, logging inside `span`
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>, span: Span) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            span,
        }
    }

    /// Source bucket
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Every object that may hold events inside `window`, in listing order
    ///
    /// Day prefixes are listed in ascending order, so keys come back sorted
    /// whenever the store lists in key order. Listing failures are fatal;
    /// bucket creation is best-effort.
    pub async fn select(&self, window: &ReplayWindow) -> Result<Vec<ObjectKey>> {
        async {
            if let Err(e) = self.storage.ensure_bucket(&self.bucket).await {
                warn!("Could not ensure bucket {} exists: {}", self.bucket, e);
            }

            let mut seen = HashSet::new();
            let mut selected = Vec::new();
            for prefix in window.day_prefixes() {
                let listed = self
                    .storage
                    .list(&self.bucket, &prefix)
                    .await
                    .map_err(|e| {
                        ReplayError::storage_unavailable(
                            format!("listing {}/{} failed", self.bucket, prefix),
                            e,
                        )
                    })?;

                let before = selected.len();
                for object in listed {
                    if window.admits_object(&object.last_modified)
                        && seen.insert(object.path.clone())
                    {
                        selected.push(object);
                    }
                }
                debug!(
                    "Prefix {} contributed {} objects",
                    prefix,
                    selected.len() - before
                );
            }

            let total_bytes: u64 = selected.iter().map(|o| o.size).sum();
            info!(
                objects = selected.len(),
                bytes = total_bytes,
                "Selected {} objects from {} for {}",
                selected.len(),
                self.bucket,
                window
            );
            Ok(selected)
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{parse_timezone, DEFAULT_TIMEZONE};
    use chrono::{DateTime, TimeDelta, Utc};
    use edge_replay_storage::MemoryStorage;

    fn window() -> ReplayWindow {
        ReplayWindow::parse(
            "2024-01-01 00:00:00",
            "2024-01-01 01:00:00",
            parse_timezone(DEFAULT_TIMEZONE).unwrap(),
        )
        .unwrap()
    }

    fn put(storage: &MemoryStorage, key: &str, modified: DateTime<Utc>) {
        storage.put("edge", key, &b"x"[..], modified);
    }

    #[tokio::test]
    async fn test_selects_by_last_modified() {
        let storage = Arc::new(MemoryStorage::new());
        let w = window();
        let start = w.start_utc();
        let end = w.end_utc();

        put(&storage, "20240101/before", start - TimeDelta::seconds(1));
        put(&storage, "20240101/at-start", start);
        put(&storage, "20240101/inside", start + TimeDelta::minutes(30));
        put(&storage, "20240101/late", end + TimeDelta::minutes(30));
        put(&storage, "20240101/too-late", end + TimeDelta::hours(2));
        put(&storage, "20240102/other-day", start + TimeDelta::minutes(5));

        let selector = ObjectSelector::new(storage, "edge", Span::none());
        let keys: Vec<String> = selector
            .select(&w)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.path)
            .collect();

        assert_eq!(
            keys,
            vec!["20240101/at-start", "20240101/inside", "20240101/late"]
        );
    }

    #[tokio::test]
    async fn test_spans_day_prefixes_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let w = ReplayWindow::parse(
            "2024-01-01 15:30:00",
            "2024-01-01 16:00:00",
            parse_timezone(DEFAULT_TIMEZONE).unwrap(),
        )
        .unwrap();
        let start = w.start_utc();

        put(&storage, "20240102/a", start + TimeDelta::minutes(10));
        put(&storage, "20240101/z", start + TimeDelta::minutes(5));
        put(&storage, "20240101/b", start);

        let selector = ObjectSelector::new(storage, "edge", Span::none());
        let keys: Vec<String> = selector
            .select(&w)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.path)
            .collect();

        assert_eq!(keys, vec!["20240101/b", "20240101/z", "20240102/a"]);
    }

    #[tokio::test]
    async fn test_creates_missing_bucket() {
        let storage = Arc::new(MemoryStorage::new());
        let selector = ObjectSelector::new(storage.clone(), "edge", Span::none());
        assert!(selector.select(&window()).await.unwrap().is_empty());
        assert!(storage.has_bucket("edge"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_bucket("edge");
        let selector = ObjectSelector::new(storage, "edge", Span::none());
        let err = selector.select(&window()).await.unwrap_err();
        assert!(matches!(err, ReplayError::StorageUnavailable { .. }));
    }
}
