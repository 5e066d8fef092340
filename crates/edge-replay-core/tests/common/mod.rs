//! Shared fakes for edge-replay-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use edge_replay_core::prelude::*;
use edge_replay_storage::{
    decode_gzip, encode_gzip, MemoryStorage, ObjectKey, ObjectStorage, StorageError,
};
use edge_replay_warehouse::connection::{LoadTransaction, Warehouse, WarehouseConnection};
use edge_replay_warehouse::copy::{CopyAuthorization, CopyOptions, CopySource};
use edge_replay_warehouse::sql::{RowWindow, TableRef};
use edge_replay_warehouse::{WarehouseError, Result as WarehouseResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const EDGE_BUCKET: &str = "edge";
pub const STAGING_BUCKET: &str = "compacter";

/// One live or staged row: event time plus the raw tab-separated line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub time: DateTime<FixedOffset>,
    pub line: String,
}

impl Row {
    pub fn new(time: &str, payload: &str) -> Self {
        Self {
            time: DateTime::parse_from_rfc3339(time).unwrap(),
            line: format!("{}\t{}", time, payload),
        }
    }
}

type Tables = BTreeMap<String, Vec<Row>>;

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    failing_copies: Mutex<HashSet<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Warehouse fake that loads staged gzip TSV objects from a [`MemoryStorage`]
///
/// Transactions work on private copies of the tables they touch; commit
/// publishes only those tables and rollback discards them.
#[derive(Clone)]
pub struct MemoryWarehouse {
    inner: Arc<Inner>,
    staging: Arc<dyn ObjectStorage>,
}

impl MemoryWarehouse {
    pub fn new(staging: Arc<dyn ObjectStorage>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            staging,
        }
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.inner.tables.lock().insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .lock()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_copy_for(&self, table: &str) {
        self.inner.failing_copies.lock().insert(table.to_string());
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn connect(&self) -> WarehouseResult<Box<dyn WarehouseConnection>> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            warehouse: self.clone(),
        }))
    }
}

struct MemoryConnection {
    warehouse: MemoryWarehouse,
}

#[async_trait]
impl WarehouseConnection for MemoryConnection {
    async fn begin(&self) -> WarehouseResult<Box<dyn LoadTransaction>> {
        Ok(Box::new(MemoryTransaction {
            warehouse: self.warehouse.clone(),
            working: Mutex::new(Tables::new()),
            import: Mutex::new(None),
        }))
    }

    async fn close(&self) -> WarehouseResult<()> {
        self.warehouse.inner.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryTransaction {
    warehouse: MemoryWarehouse,
    /// Write set: committed rows copied in on first touch
    working: Mutex<Tables>,
    import: Mutex<Option<Vec<Row>>>,
}

impl MemoryTransaction {
    fn with_table<R>(&self, table: &str, f: impl FnOnce(&mut Vec<Row>) -> R) -> R {
        let mut working = self.working.lock();
        let rows = working.entry(table.to_string()).or_insert_with(|| {
            self.warehouse
                .inner
                .tables
                .lock()
                .get(table)
                .cloned()
                .unwrap_or_default()
        });
        f(rows)
    }

    fn missing_import(import_table: &str) -> WarehouseError {
        WarehouseError::query_with_sql(
            format!("relation \"{}\" does not exist", import_table),
            import_table,
        )
    }
}

#[async_trait]
impl LoadTransaction for MemoryTransaction {
    async fn delete_window(&self, target: &TableRef, window: &RowWindow) -> WarehouseResult<u64> {
        tokio::task::yield_now().await;
        Ok(self.with_table(&target.table, |rows| {
            let before = rows.len();
            rows.retain(|row| !window.contains(&row.time));
            (before - rows.len()) as u64
        }))
    }

    async fn create_import_table(
        &self,
        _import_table: &str,
        _target: &TableRef,
    ) -> WarehouseResult<()> {
        *self.import.lock() = Some(Vec::new());
        Ok(())
    }

    async fn copy_into_import(
        &self,
        import_table: &str,
        source: &CopySource,
        _auth: &CopyAuthorization,
        _options: &CopyOptions,
    ) -> WarehouseResult<()> {
        tokio::task::yield_now().await;
        if self
            .warehouse
            .inner
            .failing_copies
            .lock()
            .contains(&source.table)
        {
            return Err(WarehouseError::load(
                &source.table,
                "S3ServiceException: access denied",
            ));
        }

        let objects = self
            .warehouse
            .staging
            .list(&source.bucket, &source.prefix())
            .await
            .map_err(|e| WarehouseError::load(&source.table, e.to_string()))?;

        let mut loaded = Vec::new();
        for object in objects {
            let raw = self
                .warehouse
                .staging
                .get(&source.bucket, &object.path)
                .await
                .map_err(|e| WarehouseError::load(&source.table, e.to_string()))?;
            let text = decode_gzip(&object.path, &raw)
                .map_err(|e| WarehouseError::load(&source.table, e.to_string()))?;
            for line in String::from_utf8_lossy(&text).lines() {
                let time = line.split('\t').next().unwrap_or_default();
                let time = DateTime::parse_from_rfc3339(time).map_err(|e| {
                    WarehouseError::load(&source.table, format!("bad time '{}': {}", time, e))
                })?;
                loaded.push(Row {
                    time,
                    line: line.to_string(),
                });
            }
        }

        self.import
            .lock()
            .as_mut()
            .ok_or_else(|| Self::missing_import(import_table))?
            .extend(loaded);
        Ok(())
    }

    async fn insert_window(
        &self,
        import_table: &str,
        target: &TableRef,
        window: &RowWindow,
    ) -> WarehouseResult<u64> {
        let import = self.import.lock();
        let staged = import
            .as_ref()
            .ok_or_else(|| Self::missing_import(import_table))?;
        let selected: Vec<Row> = staged
            .iter()
            .filter(|row| window.contains(&row.time))
            .cloned()
            .collect();
        drop(import);
        let count = selected.len() as u64;
        self.with_table(&target.table, |rows| rows.extend(selected));
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> WarehouseResult<()> {
        let this = *self;
        let touched = this.working.into_inner();
        this.warehouse.inner.tables.lock().extend(touched);
        this.warehouse.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> WarehouseResult<()> {
        self.warehouse.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn pacific() -> Tz {
    parse_timezone(DEFAULT_TIMEZONE).unwrap()
}

pub fn window(start: &str, end: &str) -> ReplayWindow {
    ReplayWindow::parse(start, end, pacific()).unwrap()
}

pub fn run_tag(tag: &str) -> RunTag {
    RunTag::parse(tag).unwrap()
}

/// Write `rows` as one staged gzip TSV object for `table`
pub fn stage_rows(storage: &MemoryStorage, run_tag: &RunTag, table: &str, rows: &[Row]) {
    let mut body = String::new();
    for row in rows {
        body.push_str(&row.line);
        body.push('\n');
    }
    storage.put(
        STAGING_BUCKET,
        format!("{}/{}/part-0000.gz", run_tag, table),
        encode_gzip(body.as_bytes()).unwrap(),
        chrono::Utc::now(),
    );
}

pub fn reloader(
    warehouse: &MemoryWarehouse,
    staging: Arc<dyn ObjectStorage>,
    policy: MissingStagingPolicy,
) -> TableReloader {
    TableReloader::new(
        Arc::new(warehouse.clone()),
        staging,
        STAGING_BUCKET,
        edge_replay_warehouse::connection::WarehouseConfig::new("postgres://fake/events"),
        CopyAuthorization::keys("AKIDEXAMPLE", "secret"),
        tracing::Span::none(),
    )
    .with_missing_staging(policy)
}

/// Object store over a local directory, one subdirectory per bucket
///
/// Lets a transformer subprocess stage output the reload stage can read.
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(dir: &Path, base: &Path, out: &mut Vec<(String, std::fs::Metadata)>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let meta = entry.metadata().unwrap();
            if meta.is_dir() {
                Self::walk(&path, base, out);
            } else {
                let key = path
                    .strip_prefix(base)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((key, meta));
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for DirStorage {
    async fn ensure_bucket(&self, bucket: &str) -> edge_replay_storage::Result<()> {
        std::fs::create_dir_all(self.root.join(bucket))
            .map_err(|e| StorageError::backend_with_source("create bucket", e))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> edge_replay_storage::Result<Vec<ObjectKey>> {
        let base = self.root.join(bucket);
        if !base.is_dir() {
            return Err(StorageError::NotFound(bucket.to_string()));
        }
        let mut files = Vec::new();
        Self::walk(&base, &base, &mut files);
        let mut keys: Vec<ObjectKey> = files
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, meta)| {
                let modified = meta.modified().unwrap();
                ObjectKey::new(key, modified.into(), meta.len())
            })
            .collect();
        keys.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> edge_replay_storage::Result<bytes::Bytes> {
        std::fs::read(self.root.join(bucket).join(key))
            .map(bytes::Bytes::from)
            .map_err(|_| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }
}
