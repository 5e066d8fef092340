//! CLI argument parsing for edge-replay
//!
//! Collaborator endpoints fall back to the environment, so a typical
//! invocation only names the window, the tables and the warehouse URL.

use clap::Parser;
use edge_replay_core::prelude::*;
use edge_replay_storage::S3StorageConfig;
use edge_replay_warehouse::connection::{SslMode, WarehouseConfig};
use std::path::PathBuf;

/// Edge Replay - regenerate event tables from captured edge logs
///
/// Replays the raw edge objects of a local-time window through the event
/// transformer, then reloads the regenerated rows of every target table
/// into the warehouse. Re-running a window is safe.
#[derive(Parser, Debug)]
#[command(name = "edge-replay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ============ Window & Tables ============
    /// Window start, "YYYY-MM-DD HH:MM:SS" in the local zone
    #[arg(value_name = "START")]
    pub start: String,

    /// Window end (exclusive), same format as START
    #[arg(value_name = "END")]
    pub end: String,

    /// Tables to regenerate
    #[arg(value_name = "TABLE")]
    pub tables: Vec<String>,

    /// Regenerate every table known to the metadata service
    #[arg(long, conflicts_with = "tables")]
    pub all_tables: bool,

    /// Time zone START and END are expressed in
    #[arg(long, default_value = DEFAULT_TIMEZONE, env = "REPLAY_TIMEZONE")]
    pub timezone: String,

    // ============ Stages ============
    /// Run the replay stage only and skip the warehouse reload
    #[arg(long)]
    pub processor_only: bool,

    /// Skip the replay stage and reload from the output of an earlier run
    #[arg(long = "from-runtag", value_name = "RUNTAG")]
    pub from_runtag: Option<String>,

    // ============ Storage & Metadata ============
    /// Bucket holding the raw edge objects
    #[arg(long, env = "EDGE_BUCKET")]
    pub edge_bucket: Option<String>,

    /// Bucket the transformer stages its output into (needed to reload)
    #[arg(long, env = "COMPACTER_BUCKET")]
    pub staging_bucket: Option<String>,

    /// Metadata service listing every known table (needed by --all-tables)
    #[arg(long, env = "BLUEPRINT_URL")]
    pub blueprint_url: Option<String>,

    /// AWS region of the buckets
    #[arg(long, default_value = "us-west-2", env = "AWS_REGION")]
    pub region: String,

    /// Custom S3 endpoint (MinIO and other S3-compatible stores)
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    // ============ Replay ============
    /// Transformer executable, invoked with the run tag as its only argument
    #[arg(long, default_value = DEFAULT_TRANSFORMER, env = "REPLAY_TRANSFORMER")]
    pub transformer: PathBuf,

    /// Replay partitions in flight (defaults to the available parallelism)
    #[arg(long, env = "REPLAY_PARALLELISM")]
    pub replay_parallelism: Option<usize>,

    /// Stop dispatching partitions after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    // ============ Warehouse ============
    /// `postgres://` style URL of the warehouse
    #[arg(long, env = "REDSHIFT_URL", required_unless_present = "processor_only")]
    pub rsurl: Option<String>,

    /// Tables reloaded concurrently
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub poolsize: usize,

    /// Schema holding the live tables
    #[arg(long, default_value = "logs", env = "REDSHIFT_SCHEMA")]
    pub schema: String,

    /// Event timestamp column of the live tables
    #[arg(long, default_value = "time")]
    pub time_column: String,

    /// IAM role the warehouse assumes to read staged output
    /// (access keys from the AWS credential chain otherwise)
    #[arg(long, env = "REDSHIFT_IAM_ROLE")]
    pub iam_role: Option<String>,

    /// SSL mode for warehouse sessions (disable, require)
    #[arg(long, default_value = "require", env = "REDSHIFT_SSL_MODE")]
    pub ssl_mode: SslMode,

    /// Empty a table's window even when nothing was staged for it
    #[arg(long)]
    pub clear_missing_staging: bool,

    // ============ Logging ============
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.all_tables && self.tables.is_empty() {
            return Err("name at least one TABLE or pass --all-tables".to_string());
        }

        if self.all_tables && !self.processor_only && self.blueprint_url.is_none() {
            return Err(
                "--all-tables needs the metadata service (--blueprint-url / BLUEPRINT_URL)"
                    .to_string(),
            );
        }

        if !self.processor_only && self.poolsize == 0 {
            return Err("poolsize must be at least 1".to_string());
        }

        Ok(())
    }

    /// Stages selected by --processor-only and --from-runtag
    pub fn stage_selection(&self) -> Result<StageSelection> {
        let from = self.from_runtag.as_deref().map(RunTag::parse).transpose()?;
        StageSelection::from_flags(self.processor_only, from)
    }

    /// Target tables
    pub fn target_tables(&self) -> Result<TargetTables> {
        if self.all_tables {
            Ok(TargetTables::All)
        } else {
            TargetTables::explicit(self.tables.iter().cloned())
        }
    }

    /// Build the validated run configuration
    pub fn to_replay_config(&self) -> Result<ReplayConfig> {
        let tz = parse_timezone(&self.timezone)?;
        let window = ReplayWindow::parse(&self.start, &self.end, tz)?;

        let mut config = ReplayConfig::new(window, self.target_tables()?, self.stage_selection()?)
            .with_buckets(
                self.edge_bucket.clone().unwrap_or_default(),
                self.staging_bucket.clone().unwrap_or_default(),
            )
            .with_reload_pool_size(self.poolsize);

        if let Some(parallelism) = self.replay_parallelism {
            config = config.with_replay_parallelism(parallelism);
        }
        if self.fail_fast {
            config = config.with_failure_policy(FailurePolicy::FailFast);
        }
        if self.clear_missing_staging {
            config = config.with_missing_staging(MissingStagingPolicy::ClearWindow);
        }

        config.ensure_valid()?;
        Ok(config)
    }

    /// S3 client configuration for the edge and staging buckets
    pub fn to_storage_config(&self) -> S3StorageConfig {
        S3StorageConfig {
            region: self.region.clone(),
            endpoint_url: self.s3_endpoint.clone(),
            force_path_style: self.s3_endpoint.is_some(),
            ..Default::default()
        }
    }

    /// Warehouse session configuration, absent without --rsurl
    pub fn to_warehouse_config(&self) -> Option<WarehouseConfig> {
        self.rsurl.as_ref().map(|url| {
            WarehouseConfig::new(url.clone())
                .with_schema(self.schema.clone())
                .with_time_column(self.time_column.clone())
                .with_ssl_mode(self.ssl_mode)
        })
    }
}
