//! Pool settings read from `PG_*` environment variables.

use std::time::Duration;

use relpool::{PoolConfig, PoolError, Result};

/// Pool bounds used when the environment does not override them.
const DEFAULT_MAX_CONNS: u32 = 10;
const DEFAULT_MIN_CONNS: u32 = 2;
const DEFAULT_MAX_CONN_LIFETIME: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_CONN_IDLE: Duration = Duration::from_secs(10 * 60);
const DEFAULT_HEALTH_CHECK: Duration = Duration::from_secs(2 * 60);

/// Read the pool configuration from the process environment.
pub fn from_env() -> Result<PoolConfig> {
    load(|key| std::env::var(key).ok())
}

/// Build the pool configuration from `lookup`.
///
/// `PG_HOST`, `PG_PORT`, `PG_USERNAME`, `PG_PASSWORD` and `PG_DBNAME` are
/// required. Pool bounds and durations are optional.
pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<PoolConfig> {
    let required = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .ok_or_else(|| PoolError::config(format!("config unavailable: {key} is not set")))
    };

    let port = required("PG_PORT")?;
    let port: u16 = port
        .parse()
        .map_err(|_| PoolError::config(format!("PG_PORT is not a valid port: {port}")))?;

    let password = lookup("PG_PASSWORD")
        .ok_or_else(|| PoolError::config("config unavailable: PG_PASSWORD is not set"))?;
    let max_lifetime =
        seconds(&lookup, "PG_MAX_CONN_LIFETIME_SECS")?.unwrap_or(DEFAULT_MAX_CONN_LIFETIME);
    let max_idle_time =
        seconds(&lookup, "PG_MAX_CONN_IDLE_SECS")?.unwrap_or(DEFAULT_MAX_CONN_IDLE);
    let health_check_period =
        seconds(&lookup, "PG_HEALTH_CHECK_SECS")?.unwrap_or(DEFAULT_HEALTH_CHECK);

    let config = PoolConfig::new()
        .host(required("PG_HOST")?)
        .port(port)
        .username(required("PG_USERNAME")?)
        .password(password)
        .database(required("PG_DBNAME")?)
        .max_connections(optional(&lookup, "PG_MAX_CONNS")?.unwrap_or(DEFAULT_MAX_CONNS))
        .min_connections(optional(&lookup, "PG_MIN_CONNS")?.unwrap_or(DEFAULT_MIN_CONNS))
        .max_lifetime(max_lifetime)
        .max_idle_time(max_idle_time)
        .health_check_period(health_check_period);

    config.validate()?;
    Ok(config)
}

fn optional<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PoolError::config(format!("{key} is not a valid number: {value}"))),
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(optional::<u64>(lookup, key)?.map(Duration::from_secs))
}
