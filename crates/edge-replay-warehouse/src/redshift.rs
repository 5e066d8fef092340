//! Amazon Redshift backend
//!
//! Talks to Redshift over the PostgreSQL wire protocol with `tokio-postgres`.
//! Each session owns one client and a background task driving the socket;
//! transactions are issued as explicit `BEGIN`/`COMMIT`/`ROLLBACK` statements.
//!
//! # Example
//!
//! ```rust,ignore
//! use edge_replay_warehouse::prelude::*;
//!
//! let warehouse = RedshiftWarehouse::new(WarehouseConfig::new(url))?;
//! let conn = warehouse.connect().await?;
//! let tx = conn.begin().await?;
//! let deleted = tx.delete_window(&target, &window).await?;
//! tx.commit().await?;
//! conn.close().await?;
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, error};
use validator::Validate;

use crate::connection::{
    LoadTransaction, SslMode, Warehouse, WarehouseConfig, WarehouseConnection,
};
use crate::copy::{CopyAuthorization, CopyOptions, CopySource};
use crate::error::{Result, WarehouseError};
use crate::sql::{self, RowWindow, TableRef};

/// Redshift [`Warehouse`] opening one TCP session per [`connect`](Warehouse::connect)
#[derive(Debug, Clone)]
pub struct RedshiftWarehouse {
    config: WarehouseConfig,
}

impl RedshiftWarehouse {
    /// Create a warehouse from validated configuration
    pub fn new(config: WarehouseConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| WarehouseError::config(e.to_string()))?;
        Ok(Self { config })
    }

    /// The configuration sessions are opened with
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    fn pg_config(&self) -> Result<tokio_postgres::Config> {
        let mut pg_config: tokio_postgres::Config = self
            .config
            .url
            .parse()
            .map_err(|e| WarehouseError::config(format!("invalid warehouse url: {}", e)))?;
        pg_config.connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));
        if let Some(name) = &self.config.application_name {
            pg_config.application_name(name);
        }
        Ok(pg_config)
    }
}

fn tls_connector() -> Result<MakeRustlsConnect> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| WarehouseError::config(format!("TLS setup failed: {}", e)))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(MakeRustlsConnect::new(tls_config))
}

#[async_trait]
impl Warehouse for RedshiftWarehouse {
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>> {
        let pg_config = self.pg_config()?;
        debug!("Connecting to {}", self.config.redacted_url());

        let (client, handle) = match self.config.ssl_mode {
            SslMode::Disable => {
                let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
                    WarehouseError::connection_with_source("failed to connect to Redshift", e)
                })?;
                let handle = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Redshift connection error: {}", e);
                    }
                });
                (client, handle)
            }
            SslMode::Require => {
                let tls = tls_connector()?;
                let (client, connection) = pg_config.connect(tls).await.map_err(|e| {
                    WarehouseError::connection_with_source(
                        "failed to connect to Redshift with TLS",
                        e,
                    )
                })?;
                let handle = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Redshift connection error: {}", e);
                    }
                });
                (client, handle)
            }
        };

        Ok(Box::new(RedshiftConnection {
            client: Arc::new(client),
            handle,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One Redshift session
pub struct RedshiftConnection {
    client: Arc<Client>,
    handle: JoinHandle<()>,
    closed: AtomicBool,
}

#[async_trait]
impl WarehouseConnection for RedshiftConnection {
    async fn begin(&self) -> Result<Box<dyn LoadTransaction>> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(WarehouseError::connection("connection is closed"));
        }

        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| WarehouseError::transaction_with_source(e.to_string(), e))?;

        Ok(Box::new(RedshiftTransaction {
            client: Arc::clone(&self.client),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        self.handle.abort();
        Ok(())
    }
}

impl Drop for RedshiftConnection {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Transaction over a [`RedshiftConnection`]
pub struct RedshiftTransaction {
    client: Arc<Client>,
}

impl RedshiftTransaction {
    async fn execute(&self, statement: &str) -> Result<u64> {
        self.client
            .execute(statement, &[])
            .await
            .map_err(|e| WarehouseError::query_with_sql(e.to_string(), statement))
    }

    async fn end(&self, statement: &str) -> Result<()> {
        self.client
            .batch_execute(statement)
            .await
            .map_err(|e| WarehouseError::transaction_with_source(e.to_string(), e))
    }
}

#[async_trait]
impl LoadTransaction for RedshiftTransaction {
    async fn delete_window(&self, target: &TableRef, window: &RowWindow) -> Result<u64> {
        self.execute(&sql::delete_window(target, window)).await
    }

    async fn create_import_table(&self, import_table: &str, target: &TableRef) -> Result<()> {
        let statement = sql::create_import_table(import_table, target);
        self.client
            .batch_execute(&statement)
            .await
            .map_err(|e| WarehouseError::query_with_sql(e.to_string(), statement))
    }

    async fn copy_into_import(
        &self,
        import_table: &str,
        source: &CopySource,
        auth: &CopyAuthorization,
        options: &CopyOptions,
    ) -> Result<()> {
        // The statement embeds credentials; keep it out of the error.
        let statement = sql::copy_into(import_table, source, auth, options);
        self.client
            .batch_execute(&statement)
            .await
            .map_err(|e| WarehouseError::load(&source.table, e.to_string()))
    }

    async fn insert_window(
        &self,
        import_table: &str,
        target: &TableRef,
        window: &RowWindow,
    ) -> Result<u64> {
        self.execute(&sql::insert_window(import_table, target, window))
            .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.end("ROLLBACK").await
    }
}
