//! Partitioned execution of the replay stage
//!
//! The engine takes the selected object keys and a partition count, splits
//! the keys into contiguous partitions and hands each one to a
//! [`PartitionHandler`]. [`LocalEngine`] runs partitions as tokio tasks with
//! a bounded number in flight.
//!
//! ## Failure policies
//!
//! - [`FailurePolicy::FailFast`]: once a partition fails no new partition is
//!   started; partitions already running finish
//! - [`FailurePolicy::Continue`]: every partition runs regardless

use async_trait::async_trait;
use edge_replay_storage::ObjectKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, Instrument, Span};

use crate::error::{ReplayError, Result};

/// Keys handed to one partition at most, on average
pub const KEYS_PER_PARTITION: usize = 100;

/// Partition count used for `key_count` keys
pub fn partition_count(key_count: usize) -> usize {
    key_count / KEYS_PER_PARTITION + 1
}

/// Split `items` into `count` contiguous slices whose sizes differ by at most one
pub fn split_contiguous<T>(items: Vec<T>, count: usize) -> Vec<Vec<T>> {
    let count = count.max(1);
    let len = items.len();
    let mut iter = items.into_iter();
    (0..count)
        .map(|i| {
            let size = (i + 1) * len / count - i * len / count;
            iter.by_ref().take(size).collect()
        })
        .collect()
}

/// One unit of replay work
#[derive(Debug, Clone)]
pub struct Partition {
    /// Position among the partitions of the stage
    pub index: usize,
    /// Keys processed by this partition, in selection order
    pub keys: Vec<ObjectKey>,
}

/// Counters reported by one partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    /// Objects fetched
    pub objects: u64,
    /// Compressed bytes fetched
    pub bytes_read: u64,
    /// Bytes after decompression
    pub bytes_decompressed: u64,
    /// Bytes written to the transformer
    pub bytes_forwarded: u64,
    /// Lines written to the transformer
    pub lines_kept: u64,
    /// Lines rejected by the signature filter
    pub lines_dropped: u64,
}

impl PartitionStats {
    /// Add another partition's counters to these
    pub fn merge(&mut self, other: &PartitionStats) {
        self.objects += other.objects;
        self.bytes_read += other.bytes_read;
        self.bytes_decompressed += other.bytes_decompressed;
        self.bytes_forwarded += other.bytes_forwarded;
        self.lines_kept += other.lines_kept;
        self.lines_dropped += other.lines_dropped;
    }
}

/// Work applied to each partition
#[async_trait]
pub trait PartitionHandler: Send + Sync {
    /// Process one partition
    async fn handle(&self, partition: Partition) -> Result<PartitionStats>;
}

/// Outcome of one stage run
#[derive(Debug, Default)]
pub struct StageReport {
    /// Partitions dispatched or held back
    pub partitions: usize,
    /// Counters of successful partitions, by index
    pub completed: Vec<(usize, PartitionStats)>,
    /// Failed partitions, by index
    pub failures: Vec<(usize, ReplayError)>,
    /// Partitions never started because of an earlier failure
    pub not_started: usize,
}

impl StageReport {
    /// Whether every partition ran and succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.not_started == 0
    }

    /// Counters summed across successful partitions
    pub fn totals(&self) -> PartitionStats {
        let mut totals = PartitionStats::default();
        for (_, stats) in &self.completed {
            totals.merge(stats);
        }
        totals
    }

    /// Turn failures into a stage error
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ReplayError::ReplayFailed {
                failed: self.failures.len() + self.not_started,
                total: self.partitions,
            })
        }
    }
}

/// Partition-map primitive
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Split `keys` into `partitions` slices and run `handler` on each non-empty one
    async fn run_partitions(
        &self,
        keys: Vec<ObjectKey>,
        partitions: usize,
        handler: Arc<dyn PartitionHandler>,
    ) -> Result<StageReport>;
}

/// What happens to pending partitions after a failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop starting partitions after the first failure
    FailFast,
    /// Run every partition
    #[default]
    Continue,
}

/// Configuration for [`LocalEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum partitions in flight
    pub parallelism: usize,
    /// Failure policy
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Available hardware parallelism, at least one
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs partitions as tokio tasks in this process
pub struct LocalEngine {
    config: EngineConfig,
    span: Span,
}

impl LocalEngine {
    /// Create an engine logging inside `span`
    pub fn new(config: EngineConfig, span: Span) -> Self {
        Self { config, span }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn run_partitions(
        &self,
        keys: Vec<ObjectKey>,
        partitions: usize,
        handler: Arc<dyn PartitionHandler>,
    ) -> Result<StageReport> {
        let work: Vec<Partition> = split_contiguous(keys, partitions)
            .into_iter()
            .enumerate()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(index, keys)| Partition { index, keys })
            .collect();

        let mut report = StageReport {
            partitions: work.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let halted = Arc::new(AtomicBool::new(false));
        let fail_fast = self.config.failure_policy == FailurePolicy::FailFast;
        let mut handles = Vec::with_capacity(work.len());

        for partition in work {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ReplayError::internal("engine semaphore closed"))?;

            if halted.load(Ordering::Acquire) {
                report.not_started += 1;
                continue;
            }

            let index = partition.index;
            debug!(
                "Starting partition {} with {} keys",
                index,
                partition.keys.len()
            );
            let handler = Arc::clone(&handler);
            let halted = Arc::clone(&halted);
            let handle = tokio::spawn(
                async move {
                    let _permit = permit; // Hold permit until the partition completes
                    let result = handler.handle(partition).await;
                    if result.is_err() && fail_fast {
                        halted.store(true, Ordering::Release);
                    }
                    result
                }
                .instrument(self.span.clone()),
            );
            handles.push((index, handle));
        }

        for (index, handle) in handles {
            match handle.await {
                Ok(Ok(stats)) => report.completed.push((index, stats)),
                Ok(Err(e)) => {
                    error!("Partition {} failed: {}", index, e);
                    report.failures.push((index, e));
                }
                Err(e) => {
                    error!("Partition {} task aborted: {}", index, e);
                    report.failures.push((
                        index,
                        ReplayError::internal(format!("partition {} task aborted: {}", index, e)),
                    ));
                }
            }
        }

        if report.not_started > 0 {
            info!(
                "{} partitions not started after an earlier failure",
                report.not_started
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn keys(n: usize) -> Vec<ObjectKey> {
        (0..n)
            .map(|i| ObjectKey::new(format!("20240101/{:04}", i), Utc::now(), 1))
            .collect()
    }

    #[test]
    fn test_partition_count() {
        assert_eq!(partition_count(0), 1);
        assert_eq!(partition_count(99), 1);
        assert_eq!(partition_count(100), 2);
        assert_eq!(partition_count(1234), 13);
    }

    #[test]
    fn test_split_contiguous_is_even_and_ordered() {
        let slices = split_contiguous((0..10).collect::<Vec<_>>(), 3);
        assert_eq!(slices, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8, 9]]);

        let slices = split_contiguous(vec![1, 2], 4);
        assert_eq!(slices.iter().filter(|s| s.is_empty()).count(), 2);
        assert_eq!(slices.concat(), vec![1, 2]);
    }

    struct CountingHandler {
        running: AtomicUsize,
        peak: AtomicUsize,
        fail_index: Option<usize>,
    }

    impl CountingHandler {
        fn new(fail_index: Option<usize>) -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_index,
            }
        }
    }

    #[async_trait]
    impl PartitionHandler for CountingHandler {
        async fn handle(&self, partition: Partition) -> Result<PartitionStats> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail_index == Some(partition.index) {
                return Err(ReplayError::TransformFailed {
                    partition: partition.index,
                    status: "exit status: 1".into(),
                });
            }
            Ok(PartitionStats {
                objects: partition.keys.len() as u64,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_runs_every_partition_with_bounded_parallelism() {
        let handler = Arc::new(CountingHandler::new(None));
        let engine = LocalEngine::new(
            EngineConfig {
                parallelism: 2,
                failure_policy: FailurePolicy::Continue,
            },
            Span::none(),
        );

        let report = engine
            .run_partitions(keys(250), 6, handler.clone())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.partitions, 6);
        assert_eq!(report.totals().objects, 250);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_partitions_not_dispatched() {
        let engine = LocalEngine::new(EngineConfig::default(), Span::none());
        let report = engine
            .run_partitions(keys(2), 5, Arc::new(CountingHandler::new(None)))
            .await
            .unwrap();
        assert_eq!(report.partitions, 2);
        assert_eq!(report.completed.len(), 2);
    }

    #[tokio::test]
    async fn test_continue_runs_remaining_partitions() {
        let engine = LocalEngine::new(
            EngineConfig {
                parallelism: 1,
                failure_policy: FailurePolicy::Continue,
            },
            Span::none(),
        );
        let report = engine
            .run_partitions(keys(4), 4, Arc::new(CountingHandler::new(Some(0))))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.completed.len(), 3);
        assert!(matches!(
            report.into_result(),
            Err(ReplayError::ReplayFailed {
                failed: 1,
                total: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_new_partitions() {
        let engine = LocalEngine::new(
            EngineConfig {
                parallelism: 1,
                failure_policy: FailurePolicy::FailFast,
            },
            Span::none(),
        );
        let report = engine
            .run_partitions(keys(4), 4, Arc::new(CountingHandler::new(Some(0))))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.not_started, 3);
        assert!(report.completed.is_empty());
        assert!(!report.is_success());
    }
}
