//! # relpool-testing
//!
//! Test infrastructure for the relpool connection pool.
//!
//! [`MockConnector`] stands in for a database driver. Tests control whether
//! the target is reachable, how long dialing takes, what statements return,
//! and when connections break, and they can observe how many connections are
//! alive at any point.
//!
//! ```rust,ignore
//! use relpool::{Pool, PoolConfig};
//! use relpool_testing::{MockConnector, test_config};
//!
//! let connector = MockConnector::new();
//! let pool = Pool::connect(test_config(), std::sync::Arc::new(connector.clone())).await?;
//! assert_eq!(connector.live_connections(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

use std::time::Duration;

use relpool::{PoolConfig, Row, Value};

pub use mock::MockConnector;

/// A valid configuration pointing at a fictional server.
#[must_use]
pub fn test_config() -> PoolConfig {
    PoolConfig::new()
        .host("db.test")
        .port(5432)
        .username("tester")
        .password("secret")
        .database("app")
        .connect_timeout(Duration::from_secs(2))
        .acquire_timeout(Duration::from_secs(2))
}

/// Build a single-column result set.
#[must_use]
pub fn single_column(name: &str, values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .map(|value| Row::new(vec![name.to_string()], vec![value]))
        .collect()
}
