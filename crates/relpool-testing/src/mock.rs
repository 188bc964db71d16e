//! Scriptable in-memory driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relpool::{ConnectTarget, Connection, Connector, PoolError, Row, Value};
use tokio::sync::watch;

/// Shared state behind a [`MockConnector`] and its connections.
#[derive(Debug)]
struct MockState {
    reachable: AtomicBool,
    ping_fails: AtomicBool,
    connect_delay: Mutex<Duration>,
    connect_attempts: AtomicUsize,
    connections_opened: AtomicUsize,
    live: AtomicUsize,
    closed_gracefully: AtomicUsize,
    /// Connections opened before this generation report themselves closed.
    broken_before: AtomicU64,
    generation: AtomicU64,
    rows: Mutex<HashMap<String, Vec<Row>>>,
    failing: Mutex<HashMap<String, String>>,
    statements: Mutex<Vec<String>>,
    paused: watch::Sender<bool>,
}

/// A [`Connector`] whose behavior is controlled by the test.
///
/// Clones share state, so a test can keep a handle after passing one to the
/// pool.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// A reachable target that answers every statement with no rows.
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Arc::new(MockState {
                reachable: AtomicBool::new(true),
                ping_fails: AtomicBool::new(false),
                connect_delay: Mutex::new(Duration::ZERO),
                connect_attempts: AtomicUsize::new(0),
                connections_opened: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                closed_gracefully: AtomicUsize::new(0),
                broken_before: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                rows: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashMap::new()),
                statements: Mutex::new(Vec::new()),
                paused,
            }),
        }
    }

    /// A target that refuses every connection.
    #[must_use]
    pub fn unreachable() -> Self {
        let connector = Self::new();
        connector.set_reachable(false);
        connector
    }

    /// Make the target accept or refuse new connections.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every ping fail.
    pub fn set_ping_fails(&self, fails: bool) {
        self.state.ping_fails.store(fails, Ordering::SeqCst);
    }

    /// Delay every connection attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    /// Answer `sql` with `rows`.
    pub fn with_rows(&self, sql: &str, rows: Vec<Row>) {
        self.state.rows.lock().insert(sql.to_string(), rows);
    }

    /// Reject `sql` with a query error carrying `message`.
    pub fn fail_statement(&self, sql: &str, message: &str) {
        self.state
            .failing
            .lock()
            .insert(sql.to_string(), message.to_string());
    }

    /// Hold every statement until [`resume_statements`](Self::resume_statements).
    pub fn pause_statements(&self) {
        self.state.paused.send_replace(true);
    }

    /// Let held statements finish.
    pub fn resume_statements(&self) {
        self.state.paused.send_replace(false);
    }

    /// Mark every connection opened so far as broken.
    pub fn break_connections(&self) {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.broken_before.store(generation, Ordering::SeqCst);
    }

    /// Number of connection attempts, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of connections successfully opened.
    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of connections currently alive.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    /// Number of connections closed through [`Connection::close`].
    #[must_use]
    pub fn connections_closed(&self) -> usize {
        self.state.closed_gracefully.load(Ordering::SeqCst)
    }

    /// Statements executed so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, PoolError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(PoolError::connection(format!(
                "connection refused: {}:{}",
                target.host, target.port
            )));
        }

        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        self.state.live.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(host = %target.host, "mock connection opened");

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            generation: self.state.generation.load(Ordering::SeqCst),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    generation: u64,
}

impl MockConnection {
    async fn run(&self, sql: &str) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::connection("connection reset by peer"));
        }

        let mut paused = self.state.paused.subscribe();
        // The sender lives in the shared state, so this cannot fail.
        let _ = paused.wait_for(|p| !*p).await;

        self.state.statements.lock().push(sql.to_string());
        if let Some(message) = self.state.failing.lock().get(sql) {
            return Err(PoolError::query(message.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&mut self) -> Result<(), PoolError> {
        if self.is_closed() || self.state.ping_fails.load(Ordering::SeqCst) {
            return Err(PoolError::connection("ping failed"));
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, PoolError> {
        self.run(sql).await?;
        Ok(self.state.rows.lock().get(sql).cloned().unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64, PoolError> {
        self.run(sql).await?;
        Ok(1)
    }

    fn is_closed(&self) -> bool {
        self.generation < self.state.broken_before.load(Ordering::SeqCst)
    }

    async fn close(self: Box<Self>) -> Result<(), PoolError> {
        self.state.closed_gracefully.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}
