//! Process-wide pool registry.
//!
//! A [`PoolRegistry`] is an exactly-once initialization barrier for one
//! [`Pool`]. The application owns the registry (typically one per process)
//! and hands the resulting pool to its components explicitly.
//!
//! ```rust,ignore
//! let registry = PoolRegistry::new();
//! let pool = registry.get_or_create(config, connector).await?;
//! // ... pass `pool` (or the registry) to whoever needs it ...
//! registry.close().await;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::config::PoolConfig;
use crate::driver::Connector;
use crate::error::{PoolError, Result};
use crate::pool::Pool;

/// Lifecycle of the pool held by a [`PoolRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No pool has been created yet, or the last attempt failed.
    Uninitialized,
    /// A caller is building the pool and running the liveness check.
    Initializing,
    /// The pool is serving requests.
    Ready,
    /// The pool is being closed.
    Closing,
    /// The pool is closed. Terminal.
    Closed,
}

/// Owner of a single shared [`Pool`].
///
/// Concurrent [`get_or_create`](Self::get_or_create) calls converge on one
/// pool: the first caller builds it, the others wait for and share its
/// result. A failed initialization leaves the registry uninitialized so a
/// later call can retry. After [`close`](Self::close) every call fails with
/// [`PoolError::Closed`].
#[derive(Debug)]
pub struct PoolRegistry {
    pool: OnceCell<Pool>,
    state: Mutex<PoolState>,
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: OnceCell::new(),
            state: Mutex::new(PoolState::Uninitialized),
        }
    }

    /// Return the shared pool, creating it on first use.
    ///
    /// Once a pool exists, `config` and `connector` are ignored; a differing
    /// configuration is logged.
    pub async fn get_or_create(
        &self,
        config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Pool> {
        self.ensure_open()?;

        if let Some(pool) = self.pool.get() {
            if *pool.config() != config.with_defaults_applied() {
                tracing::warn!("pool already initialized; ignoring differing configuration");
            }
            return Ok(pool.clone());
        }

        let pool = self
            .pool
            .get_or_try_init(|| async move {
                self.transition(PoolState::Uninitialized, PoolState::Initializing);
                let result = Pool::connect(config, connector).await;
                match &result {
                    Ok(_) => self.transition(PoolState::Initializing, PoolState::Ready),
                    Err(e) => {
                        tracing::warn!(error = %e, "pool initialization failed");
                        self.transition(PoolState::Initializing, PoolState::Uninitialized);
                    }
                }
                result
            })
            .await?
            .clone();

        // A concurrent close may have missed this pool.
        if self.ensure_open().is_err() {
            pool.close().await;
            return Err(PoolError::Closed);
        }

        Ok(pool)
    }

    /// The shared pool, if it is ready.
    #[must_use]
    pub fn get(&self) -> Option<Pool> {
        match self.state() {
            PoolState::Ready => self.pool.get().cloned(),
            _ => None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    /// Close the shared pool and refuse further requests.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, PoolState::Closing | PoolState::Closed) {
                return;
            }
            *state = PoolState::Closing;
        }

        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }

        *self.state.lock() = PoolState::Closed;
        tracing::debug!("pool registry closed");
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            PoolState::Closing | PoolState::Closed => Err(PoolError::Closed),
            _ => Ok(()),
        }
    }

    /// Move from `from` to `to`, unless the registry was closed meanwhile.
    fn transition(&self, from: PoolState, to: PoolState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
