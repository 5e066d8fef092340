//! Transactional reload of one live table from staged output
//!
//! A reload runs in its own session and transaction:
//!
//! 1. delete live rows inside the window
//! 2. create the session-scoped import table
//! 3. bulk-load the staged prefix into it
//! 4. insert the in-window import rows into the live table
//! 5. commit
//!
//! Any failure rolls the transaction back, leaving the live table as it was.
//! The session is released on every path.

use edge_replay_storage::ObjectStorage;
use edge_replay_warehouse::connection::{
    LoadTransaction, Warehouse, WarehouseConfig, WarehouseConnection,
};
use edge_replay_warehouse::copy::{CopyAuthorization, CopyOptions, CopySource};
use edge_replay_warehouse::sql::{RowWindow, TableRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::error::{ReplayError, Result};
use crate::run_tag::RunTag;
use crate::window::ReplayWindow;

/// What to do when a table has nothing staged for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStagingPolicy {
    /// Check before deleting and leave the table untouched
    #[default]
    Skip,
    /// Delete the window, then find nothing to insert and commit the delete
    ClearWindow,
}

/// Result of a successful reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// Window replaced by staged rows
    Loaded { deleted: u64, inserted: u64 },
    /// Nothing staged, table untouched
    Skipped,
    /// Nothing staged, window emptied
    Cleared { deleted: u64 },
}

/// Reloads tables from a staging bucket into the warehouse
pub struct TableReloader {
    warehouse: Arc<dyn Warehouse>,
    staging: Arc<dyn ObjectStorage>,
    staging_bucket: String,
    config: WarehouseConfig,
    authorization: CopyAuthorization,
    options: CopyOptions,
    missing_staging: MissingStagingPolicy,
    span: Span,
}

impl TableReloader {
    /// Create a reloader
    ///
    /// `config` supplies the live schema, time column and import table name.
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        staging: Arc<dyn ObjectStorage>,
        staging_bucket: impl Into<String>,
        config: WarehouseConfig,
        authorization: CopyAuthorization,
        span: Span,
    ) -> Self {
        Self {
            warehouse,
            staging,
            staging_bucket: staging_bucket.into(),
            config,
            authorization,
            options: CopyOptions::default(),
            missing_staging: MissingStagingPolicy::default(),
            span,
        }
    }

    /// Set the missing-staging policy
    pub fn with_missing_staging(mut self, policy: MissingStagingPolicy) -> Self {
        self.missing_staging = policy;
        self
    }

    /// Override the bulk-load options
    pub fn with_copy_options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    /// Staging bucket read by the bulk load
    pub fn staging_bucket(&self) -> &str {
        &self.staging_bucket
    }

    /// Replace the rows of `table` inside `window` with the rows staged under `run_tag`
    pub async fn reload_table(
        &self,
        table: &str,
        window: &ReplayWindow,
        run_tag: &RunTag,
    ) -> Result<ReloadOutcome> {
        let span = info_span!(parent: &self.span, "reload", table = %table);
        async {
            info!("starting {}", table);
            let source = CopySource::new(&self.staging_bucket, run_tag.as_str(), table);

            if self.missing_staging == MissingStagingPolicy::Skip
                && !self.staging_exists(&source).await?
            {
                warn!("No staged files in {}, leaving {} untouched", source.uri(), table);
                return Ok(ReloadOutcome::Skipped);
            }

            let conn = self
                .warehouse
                .connect()
                .await
                .map_err(|e| ReplayError::reload(table, e))?;
            let result = self
                .run_transaction(conn.as_ref(), table, &window.row_window(), &source)
                .await;
            if let Err(e) = conn.close().await {
                warn!("Closing session for {} failed: {}", table, e);
            }

            match &result {
                Ok(outcome) => info!("table {} committed: {:?}", table, outcome),
                Err(e) => error!("Write to table {} failed: {}", table, e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_transaction(
        &self,
        conn: &dyn WarehouseConnection,
        table: &str,
        window: &RowWindow,
        source: &CopySource,
    ) -> Result<ReloadOutcome> {
        let tx = conn
            .begin()
            .await
            .map_err(|e| ReplayError::reload(table, e))?;

        match self.apply(tx.as_ref(), table, window, source).await {
            Ok(outcome) => {
                tx.commit()
                    .await
                    .map_err(|e| ReplayError::reload(table, e))?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback of {} failed: {}", table, rollback);
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &dyn LoadTransaction,
        table: &str,
        window: &RowWindow,
        source: &CopySource,
    ) -> Result<ReloadOutcome> {
        let target: TableRef = self.config.table_ref(table);
        let import = &self.config.import_table;
        let wh = |e| ReplayError::reload(table, e);

        let deleted = tx.delete_window(&target, window).await.map_err(wh)?;
        info!(deleted, "deleted {} rows from {}", deleted, table);

        tx.create_import_table(import, &target).await.map_err(wh)?;

        if self.missing_staging == MissingStagingPolicy::ClearWindow
            && !self.staging_exists(source).await?
        {
            error!("No staged files in {}", source.uri());
            return Ok(ReloadOutcome::Cleared { deleted });
        }

        info!("Loading into {}", table);
        tx.copy_into_import(import, source, &self.authorization, &self.options)
            .await
            .map_err(wh)?;

        let inserted = tx.insert_window(import, &target, window).await.map_err(wh)?;
        info!(
            inserted,
            "inserted {} rows into {}, now committing", inserted, table
        );
        Ok(ReloadOutcome::Loaded { deleted, inserted })
    }

    async fn staging_exists(&self, source: &CopySource) -> Result<bool> {
        match self
            .staging
            .prefix_exists(&source.bucket, &source.prefix())
            .await
        {
            Ok(exists) => Ok(exists),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(ReplayError::storage_unavailable(
                format!("checking {} failed", source.uri()),
                e,
            )),
        }
    }
}
