//! Typed run configuration
//!
//! Built once from the command line and validated before any side effect.

use validator::Validate;

use crate::coordinator::DEFAULT_POOL_SIZE;
use crate::engine::{default_parallelism, FailurePolicy};
use crate::error::{ReplayError, Result};
use crate::reload::MissingStagingPolicy;
use crate::run_tag::RunTag;
use crate::signature::SignatureFilter;
use crate::window::ReplayWindow;

/// Tables a run targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetTables {
    /// Caller-supplied tables, in first-seen order
    Explicit(Vec<String>),
    /// Every table the metadata service knows
    All,
}

impl TargetTables {
    /// Explicit tables, deduplicated preserving order
    pub fn explicit<I, S>(tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for table in tables {
            let table = table.into();
            if table.is_empty() {
                return Err(ReplayError::config("table names must not be empty"));
            }
            if !names.contains(&table) {
                names.push(table);
            }
        }
        if names.is_empty() {
            return Err(ReplayError::config(
                "no tables given; name at least one table or use --all-tables",
            ));
        }
        Ok(Self::Explicit(names))
    }

    /// Prefilter for the replay stage, absent when every table is targeted
    pub fn signature_filter(&self) -> Option<SignatureFilter> {
        match self {
            Self::Explicit(tables) => Some(SignatureFilter::for_tables(tables)),
            Self::All => None,
        }
    }
}

/// Which stages a run executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSelection {
    /// Replay under a fresh run tag, then reload
    Full,
    /// Replay under a fresh run tag only
    ReplayOnly,
    /// Reload from the output of an earlier run
    ReloadOnly(RunTag),
}

impl StageSelection {
    /// Derive the selection from the skip flags
    pub fn from_flags(processor_only: bool, from_run_tag: Option<RunTag>) -> Result<Self> {
        match (processor_only, from_run_tag) {
            (true, Some(_)) => Err(ReplayError::ConflictingStages),
            (true, None) => Ok(Self::ReplayOnly),
            (false, Some(tag)) => Ok(Self::ReloadOnly(tag)),
            (false, None) => Ok(Self::Full),
        }
    }

    /// Whether the replay stage runs
    pub fn runs_replay(&self) -> bool {
        !matches!(self, Self::ReloadOnly(_))
    }

    /// Whether the reload stage runs
    pub fn runs_reload(&self) -> bool {
        !matches!(self, Self::ReplayOnly)
    }
}

/// Options of one replay run
#[derive(Debug, Clone, Validate)]
pub struct ReplayConfig {
    /// Local-zone window to regenerate
    pub window: ReplayWindow,

    /// Target tables
    pub tables: TargetTables,

    /// Stages to run
    pub stages: StageSelection,

    /// Bucket holding raw edge objects
    pub edge_bucket: String,

    /// Bucket the transformer stages output into, read by the reload stage
    #[validate(length(max = 63))]
    pub staging_bucket: String,

    /// Replay partitions in flight
    #[validate(range(min = 1, max = 1024))]
    pub replay_parallelism: usize,

    /// What happens to pending partitions after a failure
    pub failure_policy: FailurePolicy,

    /// Tables reloaded concurrently
    #[validate(range(min = 1, max = 256))]
    pub reload_pool_size: usize,

    /// What to do when a table has nothing staged
    pub missing_staging: MissingStagingPolicy,
}

impl ReplayConfig {
    /// Configuration with default concurrency and policies
    pub fn new(window: ReplayWindow, tables: TargetTables, stages: StageSelection) -> Self {
        Self {
            window,
            tables,
            stages,
            edge_bucket: String::new(),
            staging_bucket: String::new(),
            replay_parallelism: default_parallelism(),
            failure_policy: FailurePolicy::default(),
            reload_pool_size: DEFAULT_POOL_SIZE,
            missing_staging: MissingStagingPolicy::default(),
        }
    }

    /// Set the source and staging buckets
    pub fn with_buckets(mut self, edge: impl Into<String>, staging: impl Into<String>) -> Self {
        self.edge_bucket = edge.into();
        self.staging_bucket = staging.into();
        self
    }

    /// Set replay parallelism
    pub fn with_replay_parallelism(mut self, parallelism: usize) -> Self {
        self.replay_parallelism = parallelism;
        self
    }

    /// Set the replay failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the reload pool size
    pub fn with_reload_pool_size(mut self, size: usize) -> Self {
        self.reload_pool_size = size;
        self
    }

    /// Set the missing-staging policy
    pub fn with_missing_staging(mut self, policy: MissingStagingPolicy) -> Self {
        self.missing_staging = policy;
        self
    }

    /// Check field constraints and cross-field requirements
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate()
            .map_err(|e| ReplayError::config(e.to_string()))?;
        if self.stages.runs_replay() && self.edge_bucket.is_empty() {
            return Err(ReplayError::config(
                "an edge bucket is required to run the replay stage",
            ));
        }
        if self.stages.runs_reload() && self.staging_bucket.is_empty() {
            return Err(ReplayError::config(
                "a staging bucket is required to run the reload stage",
            ));
        }
        if let TargetTables::Explicit(tables) = &self.tables {
            if tables.is_empty() {
                return Err(ReplayError::config("explicit table list is empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{parse_timezone, DEFAULT_TIMEZONE};

    fn window() -> ReplayWindow {
        ReplayWindow::parse(
            "2024-01-01 00:00:00",
            "2024-01-01 01:00:00",
            parse_timezone(DEFAULT_TIMEZONE).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_explicit_tables_dedup_in_order() {
        let tables = TargetTables::explicit(["impression", "click", "impression"]).unwrap();
        assert_eq!(
            tables,
            TargetTables::Explicit(vec!["impression".into(), "click".into()])
        );
        assert!(tables.signature_filter().is_some());
        assert!(TargetTables::All.signature_filter().is_none());
    }

    #[test]
    fn test_explicit_tables_rejects_empty() {
        assert!(TargetTables::explicit(Vec::<String>::new()).is_err());
        assert!(TargetTables::explicit(["click", ""]).is_err());
    }

    #[test]
    fn test_stage_selection_from_flags() {
        let tag = RunTag::parse("20240101T000000").unwrap();
        assert_eq!(
            StageSelection::from_flags(false, None).unwrap(),
            StageSelection::Full
        );
        assert_eq!(
            StageSelection::from_flags(true, None).unwrap(),
            StageSelection::ReplayOnly
        );
        assert_eq!(
            StageSelection::from_flags(false, Some(tag.clone())).unwrap(),
            StageSelection::ReloadOnly(tag.clone())
        );
        assert!(matches!(
            StageSelection::from_flags(true, Some(tag)),
            Err(ReplayError::ConflictingStages)
        ));

        assert!(!StageSelection::ReplayOnly.runs_reload());
        assert!(StageSelection::Full.runs_replay() && StageSelection::Full.runs_reload());
    }

    #[test]
    fn test_config_validation() {
        let config = ReplayConfig::new(window(), TargetTables::All, StageSelection::Full)
            .with_buckets("edge", "compacter");
        assert!(config.ensure_valid().is_ok());

        assert!(config.clone().with_reload_pool_size(0).ensure_valid().is_err());
        assert!(config
            .clone()
            .with_replay_parallelism(0)
            .ensure_valid()
            .is_err());

        let no_edge = config.clone().with_buckets("", "compacter");
        assert!(no_edge.ensure_valid().is_err());

        let mut reload_only = no_edge;
        reload_only.stages = StageSelection::ReloadOnly(RunTag::parse("r1").unwrap());
        assert!(reload_only.ensure_valid().is_ok());
    }

    #[test]
    fn test_staging_bucket_needed_only_for_reload() {
        let replay_only =
            ReplayConfig::new(window(), TargetTables::All, StageSelection::ReplayOnly)
                .with_buckets("edge", "");
        assert!(replay_only.ensure_valid().is_ok());

        let full = ReplayConfig::new(window(), TargetTables::All, StageSelection::Full)
            .with_buckets("edge", "");
        let err = full.ensure_valid().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("staging bucket"));
    }
}
