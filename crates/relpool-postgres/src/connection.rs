//! PostgreSQL connector and connection.

use std::time::Duration;

use async_trait::async_trait;
use relpool::{ConnectTarget, Connection, Connector, PoolError, Row, Value};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls};

use crate::convert::{Param, convert_row};

/// Opens plaintext PostgreSQL connections with `tokio-postgres`.
///
/// # Example
///
/// ```rust,ignore
/// let connector = PostgresConnector::new().statement_timeout(Duration::from_secs(5));
/// let pool = Pool::connect(config, Arc::new(connector)).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector {
    statement_timeout: Option<Duration>,
}

impl PostgresConnector {
    /// Create a connector with server defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort statements running longer than `timeout` on the server side.
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Driver configuration for `target`.
    #[must_use]
    pub fn pg_config(&self, target: &ConnectTarget) -> Config {
        let mut config = Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .user(&target.username)
            .application_name(&target.application_name)
            .connect_timeout(target.connect_timeout);

        if !target.password.is_empty() {
            config.password(&target.password);
        }
        if !target.database.is_empty() {
            config.dbname(&target.database);
        }
        if let Some(timeout) = self.statement_timeout {
            config.options(&format!("-c statement_timeout={}", timeout.as_millis()));
        }
        config
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, PoolError> {
        tracing::debug!(
            host = %target.host,
            port = target.port,
            database = %target.database,
            "connecting to PostgreSQL"
        );

        let (client, connection) = self.pg_config(target).connect(NoTls).await.map_err(|e| {
            PoolError::connection(format!(
                "failed to connect to {}:{}: {}",
                target.host,
                target.port,
                describe(&e)
            ))
        })?;

        // The connection object drives the socket; it finishes once the
        // client is dropped.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection terminated");
            }
        });

        Ok(Box::new(PostgresConnection { client, driver }))
    }
}

/// A single PostgreSQL session.
pub struct PostgresConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl PostgresConnection {
    fn map_error(&self, error: tokio_postgres::Error) -> PoolError {
        if error.as_db_error().is_some() {
            PoolError::query(describe(&error))
        } else if error.is_closed() || self.client.is_closed() {
            PoolError::connection(error.to_string())
        } else {
            PoolError::query(error.to_string())
        }
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn ping(&mut self) -> Result<(), PoolError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| self.map_error(e))
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, PoolError> {
        let params: Vec<Param<'_>> = params.iter().map(Param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(|e| self.map_error(e))?;

        rows.iter()
            .map(|row| {
                convert_row(row).map_err(|e| PoolError::query(format!("failed to decode row: {e}")))
            })
            .collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, PoolError> {
        let params: Vec<Param<'_>> = params.iter().map(Param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.client
            .execute(sql, &refs)
            .await
            .map_err(|e| self.map_error(e))
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed() || self.driver.is_finished()
    }

    async fn close(self: Box<Self>) -> Result<(), PoolError> {
        let Self { client, driver } = *self;
        drop(client);
        driver
            .await
            .map_err(|e| PoolError::connection(format!("connection task failed: {e}")))
    }
}

/// Error text including the server's SQLSTATE when there is one.
fn describe(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = format!("{} (SQLSTATE {})", db_error.message(), db_error.code().code());
    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {detail})"));
    }
    if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" (hint: {hint})"));
    }
    message
}
