//! Fan-out of table reloads over a bounded worker pool

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, Instrument, Span};

use crate::error::{ReplayError, Result};
use crate::reload::{ReloadOutcome, TableReloader};
use crate::run_tag::RunTag;
use crate::window::ReplayWindow;

/// Default number of tables reloaded concurrently
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Per-table results of a reload stage
#[derive(Debug, Default)]
pub struct ReloadSummary {
    /// Result of every attempted table, by name
    pub results: BTreeMap<String, Result<ReloadOutcome>>,
}

impl ReloadSummary {
    /// Tables attempted
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    /// Tables whose window was replaced by staged rows
    pub fn loaded(&self) -> usize {
        self.count(|r| matches!(r, Ok(ReloadOutcome::Loaded { .. })))
    }

    /// Tables with nothing staged
    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, Ok(ReloadOutcome::Skipped | ReloadOutcome::Cleared { .. })))
    }

    /// Tables whose reload failed and was rolled back
    pub fn failed(&self) -> usize {
        self.count(|r| r.is_err())
    }

    /// Names of the failed tables
    pub fn failed_tables(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(table, _)| table.as_str())
            .collect()
    }

    fn count(&self, pred: impl Fn(&Result<ReloadOutcome>) -> bool) -> usize {
        self.results.values().filter(|r| pred(r)).count()
    }
}

/// Runs [`TableReloader::reload_table`] for every target table
pub struct ReloadCoordinator {
    reloader: Arc<TableReloader>,
    pool_size: usize,
    span: Span,
}

impl ReloadCoordinator {
    /// Create a coordinator reloading at most `pool_size` tables at once
    pub fn new(reloader: Arc<TableReloader>, pool_size: usize, span: Span) -> Self {
        Self {
            reloader,
            pool_size: pool_size.max(1),
            span,
        }
    }

    /// Reload every table, isolating failures per table
    pub async fn reload_all(
        &self,
        tables: &[String],
        window: &ReplayWindow,
        run_tag: &RunTag,
    ) -> ReloadSummary {
        async {
            info!(
                "Reloading {} tables with {} workers from run tag {}",
                tables.len(),
                self.pool_size,
                run_tag
            );
            let semaphore = Arc::new(Semaphore::new(self.pool_size));
            let mut handles = Vec::with_capacity(tables.len());

            for table in tables {
                let semaphore = Arc::clone(&semaphore);
                let reloader = Arc::clone(&self.reloader);
                let table_name = table.clone();
                let window = *window;
                let run_tag = run_tag.clone();
                let handle = tokio::spawn(
                    async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| ReplayError::internal("reload pool closed"))?;
                        reloader.reload_table(&table_name, &window, &run_tag).await
                    }
                    .in_current_span(),
                );
                handles.push((table.clone(), handle));
            }

            let mut summary = ReloadSummary::default();
            for (table, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(ReplayError::internal(format!(
                        "reload task for {} aborted: {}",
                        table, e
                    ))),
                };
                if let Err(e) = &result {
                    error!("Reload of {} failed: {}", table, e);
                }
                summary.results.insert(table, result);
            }

            info!(
                attempted = summary.attempted(),
                loaded = summary.loaded(),
                skipped = summary.skipped(),
                failed = summary.failed(),
                "Reload finished"
            );
            summary
        }
        .instrument(self.span.clone())
        .await
    }
}
