//! # edge-replay-warehouse
//!
//! Reloads replayed event tables into the analytics warehouse.
//!
//! A reload replaces every live row of one table inside a time window with
//! the rows staged for a run, as a single transaction:
//!
//! 1. `DELETE` live rows inside the window
//! 2. `CREATE TEMP TABLE import (LIKE live)`
//! 3. `COPY import FROM 's3://staging/<run>/<table>/'`
//! 4. `INSERT INTO live SELECT * FROM import WHERE <window>`
//! 5. `COMMIT`
//!
//! ## Feature Flags
//!
//! - `redshift` - Amazon Redshift over the PostgreSQL wire protocol (default)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use edge_replay_warehouse::prelude::*;
//!
//! let config = WarehouseConfig::new("postgres://loader:pw@cluster:5439/events");
//! let warehouse = RedshiftWarehouse::new(config.clone())?;
//! let auth = resolve_copy_authorization("us-west-2").await?;
//!
//! let conn = warehouse.connect().await?;
//! let tx = conn.begin().await?;
//! tx.delete_window(&config.table_ref("click"), &window).await?;
//! // ...
//! tx.commit().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod copy;
pub mod credentials;
pub mod error;
pub mod sql;

#[cfg(feature = "redshift")]
pub mod redshift;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connection::{
        LoadTransaction, SslMode, Warehouse, WarehouseConfig, WarehouseConnection,
    };
    pub use crate::copy::{CopyAuthorization, CopyOptions, CopySource};
    pub use crate::credentials::resolve_copy_authorization;
    pub use crate::error::{ErrorCategory, Result, WarehouseError};
    pub use crate::sql::{RowWindow, TableRef};

    #[cfg(feature = "redshift")]
    pub use crate::redshift::RedshiftWarehouse;
}

pub use error::{Result, WarehouseError};
