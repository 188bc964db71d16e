//! Per-connection lifecycle tracking.

use std::time::{Duration, Instant};

/// Bookkeeping the pool keeps for every connection it owns.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-unique connection id.
    pub id: u64,
    /// When the connection was opened.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// How many times the connection has been checked out.
    pub use_count: u64,
}

impl ConnectionMetadata {
    /// Metadata for a freshly opened connection.
    #[must_use]
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }

    /// Time since the connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Record a checkout.
    pub fn mark_checked_out(&mut self) {
        self.use_count += 1;
        self.last_used_at = Instant::now();
    }

    /// Record a return to the idle list.
    pub fn mark_returned(&mut self) {
        self.last_used_at = Instant::now();
    }

    /// Whether the connection has outlived `max_lifetime`.
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.age() >= max_lifetime
    }

    /// Whether the connection has been idle for at least `max_idle_time`.
    #[must_use]
    pub fn is_idle_expired(&self, max_idle_time: Duration) -> bool {
        self.idle_time() >= max_idle_time
    }
}

/// Why a connection was taken out of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleReason {
    /// Connection exceeded its maximum lifetime.
    LifetimeExpired,
    /// Connection sat idle longer than the maximum idle time.
    IdleExpired,
    /// The driver reported the connection as closed.
    Broken,
    /// The pool was closed while the connection was out.
    PoolClosed,
}

impl RecycleReason {
    /// Short label used in log events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LifetimeExpired => "lifetime_expired",
            Self::IdleExpired => "idle_expired",
            Self::Broken => "broken",
            Self::PoolClosed => "pool_closed",
        }
    }
}
