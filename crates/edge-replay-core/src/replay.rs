//! Partitioned replay of raw edge objects through the transformer
//!
//! Each partition starts one transformer process and streams the
//! decompressed content of its objects into it, keeping only lines that
//! pass the signature filter when one is given.

use async_trait::async_trait;
use edge_replay_storage::{decode_gzip, ObjectKey, ObjectStorage};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, Instrument, Span};

use crate::engine::{
    partition_count, ExecutionEngine, Partition, PartitionHandler, PartitionStats, StageReport,
};
use crate::error::Result;
use crate::run_tag::RunTag;
use crate::signature::SignatureFilter;
use crate::transformer::TransformerCommand;

/// Streams one partition's objects into one transformer
pub struct ReplayHandler {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    transformer: TransformerCommand,
    run_tag: RunTag,
    filter: Option<SignatureFilter>,
}

impl ReplayHandler {
    /// Fetch and decompress one object, returning its compressed size and content
    async fn load(&self, key: &ObjectKey) -> Result<(usize, Vec<u8>)> {
        let raw = self.storage.get(&self.bucket, &key.path).await?;
        let data = decode_gzip(&key.path, &raw)?;
        Ok((raw.len(), data))
    }

    fn select_lines<'a>(&self, data: &'a [u8], stats: &mut PartitionStats) -> Cow<'a, [u8]> {
        match &self.filter {
            None => {
                stats.lines_kept += lines(data).count() as u64;
                Cow::Borrowed(data)
            }
            Some(filter) => {
                let mut kept = Vec::with_capacity(data.len() / 4);
                for line in lines(data) {
                    if filter.matches(line) {
                        kept.extend_from_slice(line);
                        stats.lines_kept += 1;
                    } else {
                        stats.lines_dropped += 1;
                    }
                }
                Cow::Owned(kept)
            }
        }
    }
}

fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split_inclusive(|b| *b == b'\n')
}

#[async_trait]
impl PartitionHandler for ReplayHandler {
    async fn handle(&self, partition: Partition) -> Result<PartitionStats> {
        let mut process = self.transformer.spawn(&self.run_tag, partition.index)?;
        let mut stats = PartitionStats::default();

        for key in &partition.keys {
            let (compressed, data) = match self.load(key).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    process.kill().await;
                    return Err(e);
                }
            };
            stats.objects += 1;
            stats.bytes_read += compressed as u64;
            stats.bytes_decompressed += data.len() as u64;

            let forwarded = self.select_lines(&data, &mut stats);
            debug!(
                "{}: forwarding {} of {} bytes",
                key.path,
                forwarded.len(),
                data.len()
            );
            if forwarded.is_empty() {
                continue;
            }
            if let Err(e) = process.write_all(&forwarded).await {
                return Err(process.fail_write(e).await);
            }
            stats.bytes_forwarded += forwarded.len() as u64;
        }

        process.finish().await?;
        info!(
            partition = partition.index,
            objects = stats.objects,
            lines_kept = stats.lines_kept,
            lines_dropped = stats.lines_dropped,
            "Partition {} replayed",
            partition.index
        );
        Ok(stats)
    }
}

/// Fans selected keys out across partitions of the execution engine
pub struct ReplayRunner {
    engine: Arc<dyn ExecutionEngine>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    transformer: TransformerCommand,
    span: Span,
}

impl ReplayRunner {
    /// Create a runner reading from `bucket`
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        transformer: TransformerCommand,
        span: Span,
    ) -> Self {
        Self {
            engine,
            storage,
            bucket: bucket.into(),
            transformer,
            span,
        }
    }

    /// Replay `keys` under `run_tag`, failing if any partition failed
    ///
    /// With no keys the stage is skipped and an empty report returned.
    pub async fn run(
        &self,
        keys: Vec<ObjectKey>,
        run_tag: &RunTag,
        filter: Option<SignatureFilter>,
    ) -> Result<StageReport> {
        async {
            if keys.is_empty() {
                info!("No objects selected, skipping replay");
                return Ok(StageReport::default());
            }

            let partitions = partition_count(keys.len());
            info!(
                "Replaying {} objects in {} partitions under run tag {}",
                keys.len(),
                partitions,
                run_tag
            );

            let handler = Arc::new(ReplayHandler {
                storage: Arc::clone(&self.storage),
                bucket: self.bucket.clone(),
                transformer: self.transformer.clone(),
                run_tag: run_tag.clone(),
                filter,
            });
            let report = self
                .engine
                .run_partitions(keys, partitions, handler)
                .await?;

            let totals = report.totals();
            info!(
                objects = totals.objects,
                bytes_forwarded = totals.bytes_forwarded,
                lines_kept = totals.lines_kept,
                lines_dropped = totals.lines_dropped,
                "Replay finished: {} of {} partitions succeeded",
                report.completed.len(),
                report.partitions
            );
            report.into_result()
        }
        .instrument(self.span.clone())
        .await
    }
}
