//! Driver capabilities consumed by the pool.
//!
//! The pool does not speak any wire protocol. A driver supplies a
//! [`Connector`] that opens [`Connection`]s; everything else (pooling,
//! health checks, bounds) is handled here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::row::{Row, Value};

/// Everything a driver needs to open a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Application name reported to the server.
    pub application_name: String,
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Opens new connections to a database target.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection.
    ///
    /// Unreachable targets and authentication failures are reported as
    /// [`PoolError::Connection`](crate::PoolError::Connection).
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>>;
}

/// A single live connection produced by a [`Connector`].
#[async_trait]
pub trait Connection: Send + 'static {
    /// Lightweight round-trip confirming the server is reachable.
    async fn ping(&mut self) -> Result<()>;

    /// Run a statement and collect its rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Whether the connection is known to be unusable.
    ///
    /// Broken connections are discarded instead of being returned to the
    /// idle list.
    fn is_closed(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> Result<()>;
}
