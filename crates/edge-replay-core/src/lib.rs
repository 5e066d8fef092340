//! # edge-replay-core
//!
//! Replays captured edge logs through the event transformer and reloads the
//! regenerated rows into the warehouse for a bounded time window.
//!
//! ## Stages
//!
//! - **Window** - local-zone `[start, end)` widened by an hour into UTC day prefixes
//! - **Selection** - raw objects listed under the prefixes and kept by modification time
//! - **Replay** - objects split into partitions, each streamed into one transformer
//!   process, optionally prefiltered by base64 table signatures
//! - **Reload** - per table, delete the window, bulk-load the staged output and
//!   insert the in-window rows, all in one transaction
//!
//! Re-running the same window is safe: the reload deletes before it inserts.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use edge_replay_core::prelude::*;
//!
//! let window = ReplayWindow::parse("2024-01-01 00:00:00", "2024-01-01 01:00:00", tz)?;
//! let config = ReplayConfig::new(window, TargetTables::explicit(["click"])?, StageSelection::Full)
//!     .with_buckets("edge-logs", "compacter");
//!
//! let report = ReplayPipeline::builder(config)
//!     .storage(storage)
//!     .reloader(reloader)
//!     .build()?
//!     .run()
//!     .await?;
//! ```

#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod reload;
pub mod replay;
pub mod run_tag;
pub mod selector;
pub mod signature;
pub mod transformer;
pub mod window;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{BlueprintCatalog, StaticCatalog, TableCatalog};
    pub use crate::config::{ReplayConfig, StageSelection, TargetTables};
    pub use crate::coordinator::{ReloadCoordinator, ReloadSummary, DEFAULT_POOL_SIZE};
    pub use crate::engine::{
        EngineConfig, ExecutionEngine, FailurePolicy, LocalEngine, Partition, PartitionHandler,
        PartitionStats, StageReport,
    };
    pub use crate::error::{ErrorCategory, ReplayError, Result};
    pub use crate::pipeline::{PipelineReport, ReplayPipeline, ReplayPipelineBuilder};
    pub use crate::reload::{MissingStagingPolicy, ReloadOutcome, TableReloader};
    pub use crate::replay::ReplayRunner;
    pub use crate::run_tag::RunTag;
    pub use crate::selector::ObjectSelector;
    pub use crate::signature::{SignatureFilter, SignatureSet};
    pub use crate::transformer::{TransformerCommand, DEFAULT_TRANSFORMER};
    pub use crate::window::{parse_timezone, ReplayWindow, DEFAULT_TIMEZONE};
}

pub use error::{ReplayError, Result};
