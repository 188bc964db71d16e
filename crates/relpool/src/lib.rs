//! # relpool
//!
//! Async connection pool with an explicit lifecycle for relational databases.
//!
//! The pool does not speak a wire protocol itself. A driver implements
//! [`Connector`] and [`Connection`]; the pool adds bounds, reuse, liveness
//! verification, maintenance and statistics on top.
//!
//! ## Features
//!
//! - Liveness check (ping) before a pool is handed out
//! - Configurable min/max pool sizes
//! - Maximum connection lifetime and idle time
//! - Periodic maintenance that reaps expired connections and keeps the
//!   minimum open
//! - RAII leases returned to the pool on drop
//! - Pool-direct `query`/`execute` for one-statement work
//! - Exactly-once, process-wide initialization through [`PoolRegistry`]
//! - Point-in-time [`PoolStatus`] and cumulative [`PoolMetrics`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use relpool::{PoolConfig, PoolRegistry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = PoolConfig::from_connection_string(
//!     "user=app password=secret dbname=orders host=localhost port=5432",
//! )?
//! .min_connections(2)
//! .max_connections(10)
//! .max_lifetime(Duration::from_secs(30 * 60));
//!
//! let registry = PoolRegistry::new();
//! let pool = registry.get_or_create(config, Arc::new(connector)).await?;
//!
//! // Explicit lease
//! let mut conn = pool.acquire().await?;
//! let count: i64 = conn.query_one("SELECT COUNT(*) FROM users", &[]).await?.get(0)?;
//! conn.release();
//!
//! // Pool-direct
//! let rows = pool.query("SELECT id, name FROM users", &[]).await?;
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! registry.close().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod error;
pub mod lifecycle;
mod maintenance;
pub mod pool;
pub mod registry;
pub mod row;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{ErrorKind, PoolError, Result};

// Driver seam
pub use driver::{ConnectTarget, Connection, Connector};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};
pub use registry::{PoolRegistry, PoolState};

// Lifecycle management
pub use lifecycle::{ConnectionMetadata, RecycleReason};

// Result rows
pub use row::{FromValue, Row, TypeError, Value};
