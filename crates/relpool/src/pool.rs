//! Connection pool implementation.
//!
//! Lease slots are handed out by a FIFO semaphore sized to
//! `max_connections`. Connection counts live under a single lock so a status
//! snapshot always satisfies `in_use + idle <= total <= max`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::driver::{ConnectTarget, Connection, Connector};
use crate::error::{PoolError, Result};
use crate::lifecycle::{ConnectionMetadata, RecycleReason};
use crate::maintenance;
use crate::row::{Row, Value};

/// A shared pool of database connections.
///
/// `Pool` is a cheap handle: clones share the same underlying connections.
///
/// # Example
///
/// ```rust,ignore
/// use relpool::{Pool, PoolConfig};
///
/// let config = PoolConfig::new()
///     .host("localhost")
///     .username("app")
///     .min_connections(2)
///     .max_connections(10);
///
/// let pool = Pool::connect(config, connector).await?;
///
/// // Explicit lease, returned to the pool on drop.
/// let mut conn = pool.acquire().await?;
/// let rows = conn.query("SELECT id, name FROM users", &[]).await?;
/// drop(conn);
///
/// // Pool-direct, one lease per call.
/// let affected = pool.execute("UPDATE users SET active = true", &[]).await?;
///
/// println!("{:?}", pool.status());
/// pool.close().await;
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    /// Pool configuration with defaults applied.
    config: PoolConfig,

    /// Where new connections are opened.
    target: ConnectTarget,

    /// Driver used to open connections.
    connector: Arc<dyn Connector>,

    /// One permit per lease slot.
    slots: Arc<Semaphore>,

    /// Connection accounting and the idle list.
    state: Mutex<PoolState>,

    /// Whether the pool is closed.
    closed: AtomicBool,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,

    /// Background maintenance task.
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleConnection>,
    /// Open connections plus connections currently being dialed.
    total: u32,
    /// Leased connections plus lease dials in progress.
    in_use: u32,
}

struct IdleConnection {
    conn: Box<dyn Connection>,
    meta: ConnectionMetadata,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
    lifetime_expired: u64,
    idle_expired: u64,
}

/// Undoes a connection reservation unless the dial succeeded.
///
/// Dropping an acquire future mid-dial releases the reservation here.
struct Reservation<'a> {
    inner: &'a PoolInner,
    leased: bool,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state.lock();
            state.total = state.total.saturating_sub(1);
            if self.leased {
                state.in_use = state.in_use.saturating_sub(1);
            }
        }
    }
}

enum Checkout {
    Idle(IdleConnection),
    Dial,
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Build a pool and verify the target is reachable.
    ///
    /// Opens one connection and pings it within `connect_timeout`. On
    /// failure every connection opened so far is closed and a
    /// [`PoolError::Connection`] is returned. On success the pool is filled
    /// up to `min_connections` and the maintenance task is started.
    ///
    /// Each call builds a new pool; use
    /// [`PoolRegistry`](crate::PoolRegistry) for process-wide sharing.
    pub async fn connect(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let config = config.with_defaults_applied();

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            min = config.min_connections,
            max = config.max_connections,
            "creating connection pool"
        );

        let pool = Self {
            inner: Arc::new(PoolInner {
                target: config.target(),
                slots: Arc::new(Semaphore::new(config.max_connections as usize)),
                config,
                connector,
                state: Mutex::new(PoolState::default()),
                closed: AtomicBool::new(false),
                next_connection_id: AtomicU64::new(1),
                created_at: Instant::now(),
                metrics: Mutex::new(PoolMetricsInner::default()),
                maintenance: Mutex::new(None),
            }),
        };

        if let Err(e) = pool.liveness_check().await {
            tracing::error!(error = %e, "unable to ping database");
            pool.close().await;
            return Err(e);
        }

        pool.inner.replenish().await;

        let handle = maintenance::spawn(
            Arc::downgrade(&pool.inner),
            pool.inner.config.health_check_period,
        );
        *pool.inner.maintenance.lock() = Some(handle);

        tracing::info!(status = ?pool.status(), "successfully connected to database");
        Ok(pool)
    }

    async fn liveness_check(&self) -> Result<()> {
        let deadline = self.inner.config.connect_timeout;

        let check = async {
            let mut conn = self.acquire_timeout(deadline).await?;
            conn.ping().await
        };

        match tokio::time::timeout(deadline, check).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PoolError::Connection(message))) => Err(PoolError::Connection(message)),
            Ok(Err(e)) => Err(PoolError::connection(format!("liveness check failed: {e}"))),
            Err(_) => Err(PoolError::connection(format!(
                "liveness check timed out after {deadline:?}"
            ))),
        }
    }

    /// Get a connection from the pool, waiting up to the configured acquire
    /// timeout.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.inner.config.acquire_timeout).await
    }

    /// Get a connection from the pool within `timeout`.
    ///
    /// Reuses an idle connection when one is available, otherwise opens a
    /// new one. The deadline covers both the wait for a free slot and the
    /// dial. Dropping the returned future cancels the wait.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        tracing::trace!("acquiring connection from pool");
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.checkout_connection()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::Timeout(timeout)),
        };

        match &result {
            Ok(conn) => tracing::trace!(
                connection_id = conn.meta.id,
                wait_ms = started.elapsed().as_millis() as u64,
                "connection acquired"
            ),
            Err(e) => {
                self.inner.metrics.lock().checkouts_failed += 1;
                tracing::debug!(error = %e, "failed to acquire connection");
            }
        }
        result
    }

    async fn checkout_connection(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let mut reservation = match self.inner.checkout()? {
            Checkout::Idle(entry) => return Ok(self.lease(entry, permit)),
            Checkout::Dial => Reservation {
                inner: &*self.inner,
                leased: true,
                armed: true,
            },
        };

        let entry = self.inner.open_connection().await?;
        {
            let mut state = self.inner.state.lock();
            reservation.armed = false;
            if self.inner.is_closed() {
                state.total = state.total.saturating_sub(1);
                state.in_use = state.in_use.saturating_sub(1);
                drop(state);
                self.inner
                    .discard_in_background(entry.conn, entry.meta.id, RecycleReason::PoolClosed);
                return Err(PoolError::Closed);
            }
        }
        Ok(self.lease(entry, permit))
    }

    /// Try to get an idle connection without waiting.
    ///
    /// Returns `None` if no lease slot is free or no idle connection is
    /// available. Never opens a new connection.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match self.inner.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Ok(None),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
        };

        let entry = {
            let mut state = self.inner.state.lock();
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            match self.inner.pop_idle(&mut state) {
                Some(entry) => {
                    state.in_use += 1;
                    entry
                }
                None => return Ok(None),
            }
        };

        Ok(Some(self.lease(entry, permit)))
    }

    fn lease(&self, mut entry: IdleConnection, permit: OwnedSemaphorePermit) -> PooledConnection {
        entry.meta.mark_checked_out();
        self.inner.metrics.lock().checkouts_successful += 1;
        PooledConnection {
            conn: Some(entry.conn),
            meta: entry.meta,
            pool: Arc::clone(&self.inner),
            permit: Some(permit),
        }
    }

    /// Run a statement on a pooled connection and collect its rows.
    ///
    /// The connection is leased for the duration of the call only.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut conn = self.acquire().await?;
        conn.query(sql, params).await
    }

    /// Run a statement on a pooled connection and return its first row.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row> {
        let mut conn = self.acquire().await?;
        conn.query_one(sql, params).await
    }

    /// Run a statement on a pooled connection and return the affected row
    /// count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut conn = self.acquire().await?;
        conn.execute(sql, params).await
    }

    /// Ping the database through a pooled connection.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        conn.ping().await
    }

    /// Get the current pool status.
    ///
    /// Never waits on I/O and does not consume a lease slot. The snapshot may
    /// be stale by the time the caller acts on it.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len() as u32,
            in_use: state.in_use,
            total: state.total,
            max: self.inner.config.max_connections,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            lifetime_expired: inner.lifetime_expired,
            idle_expired: inner.idle_expired,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Run one maintenance pass now.
    ///
    /// Closes idle connections past their lifetime or idle time (keeping
    /// `min_connections` open) and reopens connections up to
    /// `min_connections`.
    pub async fn run_maintenance(&self) {
        self.inner.run_maintenance().await;
    }

    /// Close the pool.
    ///
    /// Waiting acquirers fail with [`PoolError::Closed`], idle connections are
    /// closed, and leases still outstanding are closed when they are
    /// returned. Calling this more than once is harmless.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.slots.close();
        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }

        let (drained, outstanding) = {
            let mut state = self.inner.state.lock();
            let drained: Vec<IdleConnection> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len() as u32);
            (drained, state.in_use)
        };

        for entry in drained {
            self.inner
                .discard(entry.conn, entry.meta.id, RecycleReason::PoolClosed)
                .await;
        }

        tracing::info!(outstanding = outstanding, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get the pool configuration, with defaults applied.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("database", &self.inner.config.database)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PoolInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim an idle connection or reserve room to dial a new one.
    ///
    /// The caller holds a lease slot.
    fn checkout(&self) -> Result<Checkout> {
        let mut state = self.state.lock();
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        if let Some(entry) = self.pop_idle(&mut state) {
            state.in_use += 1;
            return Ok(Checkout::Idle(entry));
        }

        // Holding a slot with no idle connection left means total < max.
        state.total += 1;
        state.in_use += 1;
        Ok(Checkout::Dial)
    }

    /// Pop the most recently returned usable idle connection.
    ///
    /// Expired and broken connections found on the way are removed from the
    /// accounting and closed in the background.
    fn pop_idle(&self, state: &mut PoolState) -> Option<IdleConnection> {
        while let Some(entry) = state.idle.pop_back() {
            let reason = if entry.conn.is_closed() {
                Some(RecycleReason::Broken)
            } else if entry.meta.is_expired(self.config.max_lifetime) {
                Some(RecycleReason::LifetimeExpired)
            } else {
                None
            };

            match reason {
                None => return Some(entry),
                Some(reason) => {
                    state.total = state.total.saturating_sub(1);
                    self.discard_in_background(entry.conn, entry.meta.id, reason);
                }
            }
        }
        None
    }

    async fn open_connection(&self) -> Result<IdleConnection> {
        let timeout = self.target.connect_timeout;
        let conn = match tokio::time::timeout(timeout, self.connector.connect(&self.target)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(PoolError::connection(format!(
                    "timed out after {timeout:?} connecting to {}:{}",
                    self.target.host, self.target.port
                )));
            }
        };

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.lock().connections_created += 1;
        tracing::debug!(connection_id = id, "opened new connection");

        Ok(IdleConnection {
            conn,
            meta: ConnectionMetadata::new(id),
        })
    }

    /// Take a returned connection back.
    ///
    /// Runs from `Drop`, so closing a discarded connection happens in the
    /// background.
    fn return_connection(&self, conn: Box<dyn Connection>, mut meta: ConnectionMetadata) {
        let reason = {
            let mut state = self.state.lock();
            state.in_use = state.in_use.saturating_sub(1);

            let reason = if self.is_closed() {
                Some(RecycleReason::PoolClosed)
            } else if conn.is_closed() {
                Some(RecycleReason::Broken)
            } else if meta.is_expired(self.config.max_lifetime) {
                Some(RecycleReason::LifetimeExpired)
            } else {
                None
            };

            match reason {
                None => {
                    meta.mark_returned();
                    tracing::trace!(connection_id = meta.id, "returning connection to pool");
                    state.idle.push_back(IdleConnection { conn, meta });
                    return;
                }
                Some(reason) => {
                    state.total = state.total.saturating_sub(1);
                    reason
                }
            }
        };

        self.discard_in_background(conn, meta.id, reason);
    }

    fn record_discard(&self, connection_id: u64, reason: RecycleReason) {
        {
            let mut metrics = self.metrics.lock();
            metrics.connections_closed += 1;
            match reason {
                RecycleReason::LifetimeExpired => metrics.lifetime_expired += 1,
                RecycleReason::IdleExpired => metrics.idle_expired += 1,
                RecycleReason::Broken | RecycleReason::PoolClosed => {}
            }
        }
        match reason {
            RecycleReason::Broken => tracing::warn!(
                connection_id = connection_id,
                reason = reason.as_str(),
                "discarding connection"
            ),
            _ => tracing::debug!(
                connection_id = connection_id,
                reason = reason.as_str(),
                "closing connection"
            ),
        }
    }

    async fn discard(&self, conn: Box<dyn Connection>, connection_id: u64, reason: RecycleReason) {
        self.record_discard(connection_id, reason);
        if let Err(e) = conn.close().await {
            tracing::debug!(connection_id = connection_id, error = %e, "error closing connection");
        }
    }

    fn discard_in_background(
        &self,
        conn: Box<dyn Connection>,
        connection_id: u64,
        reason: RecycleReason,
    ) {
        self.record_discard(connection_id, reason);
        // Without a runtime the connection is simply dropped.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    tracing::debug!(
                        connection_id = connection_id,
                        error = %e,
                        "error closing connection"
                    );
                }
            });
        }
    }

    pub(crate) fn record_health_check(&self, ok: bool) {
        let mut metrics = self.metrics.lock();
        metrics.health_checks_performed += 1;
        if !ok {
            metrics.health_checks_failed += 1;
        }
    }

    /// Close expired idle connections, then top the pool back up to
    /// `min_connections`.
    pub(crate) async fn run_maintenance(&self) {
        if self.is_closed() {
            return;
        }

        let expired = {
            let mut state = self.state.lock();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut expired = Vec::new();

            while let Some(entry) = state.idle.pop_front() {
                let reason = if entry.conn.is_closed() {
                    Some(RecycleReason::Broken)
                } else if entry.meta.is_expired(self.config.max_lifetime) {
                    Some(RecycleReason::LifetimeExpired)
                } else if entry.meta.is_idle_expired(self.config.max_idle_time)
                    && state.total > self.config.min_connections
                {
                    Some(RecycleReason::IdleExpired)
                } else {
                    None
                };

                match reason {
                    Some(reason) => {
                        state.total = state.total.saturating_sub(1);
                        expired.push((entry, reason));
                    }
                    None => kept.push_back(entry),
                }
            }

            state.idle = kept;
            expired
        };

        for (entry, reason) in expired {
            self.discard(entry.conn, entry.meta.id, reason).await;
        }

        self.replenish().await;
    }

    /// Open idle connections until `min_connections` are open.
    ///
    /// Each dial holds a lease slot so the pool never exceeds
    /// `max_connections`. Failures are logged and left for the next pass.
    pub(crate) async fn replenish(&self) {
        loop {
            let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                return;
            };

            {
                let mut state = self.state.lock();
                if self.is_closed() || state.total >= self.config.min_connections {
                    return;
                }
                state.total += 1;
            }

            let mut reservation = Reservation {
                inner: self,
                leased: false,
                armed: true,
            };

            match self.open_connection().await {
                Ok(mut entry) => {
                    reservation.armed = false;
                    let mut state = self.state.lock();
                    if self.is_closed() {
                        state.total = state.total.saturating_sub(1);
                        drop(state);
                        self.discard_in_background(
                            entry.conn,
                            entry.meta.id,
                            RecycleReason::PoolClosed,
                        );
                        return;
                    }
                    entry.meta.mark_returned();
                    state.idle.push_back(entry);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open minimum connection");
                    return;
                }
            }

            drop(permit);
        }
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .pool_config(config)
///     .connector(PostgresConnector::new())
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder {
    pool_config: PoolConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            connector: None,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the driver used to open connections.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn max_idle_time(mut self, timeout: Duration) -> Self {
        self.pool_config.max_idle_time = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.pool_config.max_lifetime = lifetime;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool> {
        let connector = self
            .connector
            .ok_or_else(|| PoolError::config("no connector configured"))?;
        Pool::connect(self.pool_config, connector).await
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub idle: u32,
    /// Number of connections currently leased.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, dial errors).
    pub checkouts_failed: u64,
    /// Pings performed on leased connections.
    pub health_checks_performed: u64,
    /// Pings that failed.
    pub health_checks_failed: u64,
    /// Connections closed for exceeding their lifetime.
    pub lifetime_expired: u64,
    /// Connections closed for sitting idle too long.
    pub idle_expired: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// A connection leased from the pool.
///
/// Returned to the pool when dropped, on every exit path. Once the pool is
/// closed, statements on an outstanding lease fail with
/// [`PoolError::Connection`].
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    meta: ConnectionMetadata,
    pool: Arc<PoolInner>,
    /// Released after the connection is back on the idle list.
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    fn connection(&mut self) -> Result<&mut (dyn Connection + 'static)> {
        if self.pool.is_closed() {
            return Err(PoolError::connection(
                "connection pool closed; lease is no longer valid",
            ));
        }
        self.conn
            .as_deref_mut()
            .ok_or_else(|| PoolError::connection("connection already released"))
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.meta
    }

    /// Run a statement and collect its rows.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql = sql, params_count = params.len(), "executing query");
        self.connection()?.query(sql, params).await
    }

    /// Run a statement and return its first row.
    pub async fn query_one(&mut self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query(sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PoolError::query("query returned no rows"))
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(sql = sql, params_count = params.len(), "executing statement");
        self.connection()?.execute(sql, params).await
    }

    /// Ping the server over this connection.
    pub async fn ping(&mut self) -> Result<()> {
        let result = self.connection()?.ping().await;
        self.pool.record_health_check(result.is_ok());
        result
    }

    /// Return the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and frees its slot; the caller owns
    /// the returned connection.
    pub fn detach(mut self) -> Option<Box<dyn Connection>> {
        let conn = self.conn.take()?;
        {
            let mut state = self.pool.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            state.total = state.total.saturating_sub(1);
        }
        tracing::debug!(connection_id = self.meta.id, "connection detached from pool");
        Some(conn)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn, self.meta.clone());
        }
        drop(self.permit.take());
    }
}
