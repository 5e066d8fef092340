//! End-to-end replay run
//!
//! Resolves the target tables, replays the selected objects under a fresh
//! run tag (or reuses an earlier one) and reloads every table from the
//! staged output.
//!
//! # Example
//!
//! ```rust,ignore
//! use edge_replay_core::prelude::*;
//!
//! let pipeline = ReplayPipeline::builder(config)
//!     .storage(storage)
//!     .engine(engine)
//!     .transformer(TransformerCommand::new(DEFAULT_TRANSFORMER))
//!     .catalog(catalog)
//!     .reloader(reloader)
//!     .build()?;
//!
//! let report = pipeline.run().await?;
//! ```

use edge_replay_storage::ObjectStorage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, Instrument, Span};

use crate::catalog::TableCatalog;
use crate::config::{ReplayConfig, StageSelection, TargetTables};
use crate::coordinator::{ReloadCoordinator, ReloadSummary};
use crate::engine::{EngineConfig, ExecutionEngine, LocalEngine, PartitionStats, StageReport};
use crate::error::{ReplayError, Result};
use crate::reload::TableReloader;
use crate::replay::ReplayRunner;
use crate::run_tag::RunTag;
use crate::selector::ObjectSelector;
use crate::transformer::{TransformerCommand, DEFAULT_TRANSFORMER};

/// Outcome of a pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    /// Run tag the staged output lives under
    pub run_tag: RunTag,
    /// Tables targeted by the run
    pub tables: Vec<String>,
    /// Replay stage report, absent when the stage did not run
    pub replay: Option<StageReport>,
    /// Reload results, absent when the stage did not run
    pub reload: Option<ReloadSummary>,
}

/// Flat counters of a run, for logging
#[derive(Debug, Default, Serialize)]
pub struct RunCounters {
    /// Replay counters summed over partitions
    pub replay: PartitionStats,
    /// Tables attempted
    pub tables_attempted: usize,
    /// Tables reloaded
    pub tables_loaded: usize,
    /// Tables with nothing staged
    pub tables_skipped: usize,
    /// Tables whose reload failed
    pub tables_failed: usize,
}

impl PipelineReport {
    /// Whether any table reload failed
    pub fn has_failures(&self) -> bool {
        self.reload.as_ref().is_some_and(|r| r.failed() > 0)
    }

    /// Summary counters
    pub fn counters(&self) -> RunCounters {
        let mut counters = RunCounters::default();
        if let Some(replay) = &self.replay {
            counters.replay = replay.totals();
        }
        if let Some(reload) = &self.reload {
            counters.tables_attempted = reload.attempted();
            counters.tables_loaded = reload.loaded();
            counters.tables_skipped = reload.skipped();
            counters.tables_failed = reload.failed();
        }
        counters
    }
}

/// Replay and reload orchestrator
pub struct ReplayPipeline {
    config: ReplayConfig,
    selector: ObjectSelector,
    runner: ReplayRunner,
    catalog: Option<Arc<dyn TableCatalog>>,
    coordinator: Option<ReloadCoordinator>,
    span: Span,
}

impl ReplayPipeline {
    /// Start building a pipeline for `config`
    pub fn builder(config: ReplayConfig) -> ReplayPipelineBuilder {
        ReplayPipelineBuilder::new(config)
    }

    /// Run configuration
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Run the selected stages
    pub async fn run(&self) -> Result<PipelineReport> {
        let span = info_span!(parent: &self.span, "replay_run", window = %self.config.window);
        async {
            let tables = self.resolve_tables().await?;
            let stages = &self.config.stages;

            let (run_tag, replay) = match stages {
                StageSelection::ReloadOnly(tag) => {
                    info!("Skipping replay, reloading from run tag {}", tag);
                    (tag.clone(), None)
                }
                StageSelection::Full | StageSelection::ReplayOnly => {
                    let tag = RunTag::generate();
                    info!("Starting processors now, dumping to run tag {}", tag);
                    let report = self.replay(&tag).await?;
                    (tag, Some(report))
                }
            };

            let reload = match (&self.coordinator, stages.runs_reload()) {
                (Some(coordinator), true) => Some(
                    coordinator
                        .reload_all(&tables, &self.config.window, &run_tag)
                        .await,
                ),
                _ => None,
            };

            Ok(PipelineReport {
                run_tag,
                tables,
                replay,
                reload,
            })
        }
        .instrument(span)
        .await
    }

    async fn resolve_tables(&self) -> Result<Vec<String>> {
        match &self.config.tables {
            TargetTables::Explicit(tables) => Ok(tables.clone()),
            TargetTables::All if !self.config.stages.runs_reload() => Ok(Vec::new()),
            TargetTables::All => {
                let catalog = self
                    .catalog
                    .as_ref()
                    .ok_or_else(|| ReplayError::config("--all-tables needs a table catalog"))?;
                let tables = catalog.tables().await?;
                info!("Catalog lists {} tables", tables.len());
                Ok(tables)
            }
        }
    }

    async fn replay(&self, run_tag: &RunTag) -> Result<StageReport> {
        let keys = self.selector.select(&self.config.window).await?;
        self.runner
            .run(keys, run_tag, self.config.tables.signature_filter())
            .await
    }
}

/// Builder for [`ReplayPipeline`]
pub struct ReplayPipelineBuilder {
    config: ReplayConfig,
    storage: Option<Arc<dyn ObjectStorage>>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    transformer: Option<TransformerCommand>,
    catalog: Option<Arc<dyn TableCatalog>>,
    reloader: Option<TableReloader>,
    span: Span,
}

impl ReplayPipelineBuilder {
    fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            storage: None,
            engine: None,
            transformer: None,
            catalog: None,
            reloader: None,
            span: Span::current(),
        }
    }

    /// Object store holding the edge bucket
    pub fn storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Engine running replay partitions; a [`LocalEngine`] by default
    pub fn engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Transformer command; [`DEFAULT_TRANSFORMER`] by default
    pub fn transformer(mut self, transformer: TransformerCommand) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Catalog consulted for `--all-tables`
    pub fn catalog(mut self, catalog: Arc<dyn TableCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Reloader used by the reload stage
    pub fn reloader(mut self, reloader: TableReloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Span every component logs inside
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Validate the configuration and assemble the pipeline
    pub fn build(self) -> Result<ReplayPipeline> {
        self.config.ensure_valid()?;

        let storage = self
            .storage
            .ok_or_else(|| ReplayError::config("object storage is required"))?;

        if self.config.stages.runs_reload() && self.reloader.is_none() {
            return Err(ReplayError::config(
                "a warehouse reloader is required unless only the replay stage runs",
            ));
        }
        if self.config.tables == TargetTables::All
            && self.config.stages.runs_reload()
            && self.catalog.is_none()
        {
            return Err(ReplayError::config("--all-tables needs a table catalog"));
        }

        let span = self.span;
        let engine = self.engine.unwrap_or_else(|| {
            Arc::new(LocalEngine::new(
                EngineConfig {
                    parallelism: self.config.replay_parallelism,
                    failure_policy: self.config.failure_policy,
                },
                span.clone(),
            ))
        });
        let transformer = self
            .transformer
            .unwrap_or_else(|| TransformerCommand::new(DEFAULT_TRANSFORMER));

        let selector = ObjectSelector::new(
            Arc::clone(&storage),
            self.config.edge_bucket.clone(),
            span.clone(),
        );
        let runner = ReplayRunner::new(
            engine,
            storage,
            self.config.edge_bucket.clone(),
            transformer,
            span.clone(),
        );
        let coordinator = self.reloader.map(|reloader| {
            ReloadCoordinator::new(
                Arc::new(reloader.with_missing_staging(self.config.missing_staging)),
                self.config.reload_pool_size,
                span.clone(),
            )
        });

        Ok(ReplayPipeline {
            config: self.config,
            selector,
            runner,
            catalog: self.catalog,
            coordinator,
            span,
        })
    }
}
