//! Pool lifecycle integration tests against the mock driver.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p relpool-testing --test pool
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use relpool::{ErrorKind, Pool, PoolConfig, PoolError, PoolStatus, Value};
use relpool_testing::{MockConnector, single_column, test_config};
use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready_ok};

async fn connect(config: PoolConfig, connector: &MockConnector) -> Pool {
    Pool::connect(config, Arc::new(connector.clone()))
        .await
        .expect("pool should connect")
}

fn assert_consistent(status: PoolStatus) {
    assert!(
        status.in_use + status.idle <= status.total,
        "in_use + idle exceeds total: {status:?}"
    );
    assert!(status.total <= status.max, "total exceeds max: {status:?}");
}

/// Poll `condition` until it holds or a second passes.
async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_connect_verifies_liveness() {
    let connector = MockConnector::new();
    let pool = connect(test_config(), &connector).await;

    assert_eq!(connector.connections_opened(), 1);
    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.idle, 1);
    assert_eq!(status.in_use, 0);
    assert_eq!(pool.metrics().health_checks_performed, 1);

    pool.close().await;
}

#[tokio::test]
async fn test_unreachable_target_leaves_nothing_open() {
    let connector = MockConnector::unreachable();
    let err = Pool::connect(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_failed_ping_closes_opened_connection() {
    let connector = MockConnector::new();
    connector.set_ping_fails(true);

    let err = Pool::connect(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::Connection(_)));
    assert_eq!(connector.connections_opened(), 1);
    assert_eq!(connector.connections_closed(), 1);
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_slow_target_fails_liveness_with_connection_error() {
    let connector = MockConnector::new();
    connector.set_connect_delay(Duration::from_millis(500));

    let config = test_config().connect_timeout(Duration::from_millis(50));
    let err = Pool::connect(config, Arc::new(connector.clone()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_invalid_config_never_dials() {
    let connector = MockConnector::new();

    let config = test_config().min_connections(5).max_connections(2);
    let err = Pool::connect(config, Arc::new(connector.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let config = test_config().max_connections(0);
    assert_err!(Pool::connect(config, Arc::new(connector.clone())).await);

    assert_eq!(connector.connect_attempts(), 0);
}

#[tokio::test]
async fn test_warm_up_to_min_connections() {
    let connector = MockConnector::new();
    let config = test_config().min_connections(2).max_connections(10);
    let pool = connect(config, &connector).await;

    let status = pool.status();
    assert_eq!(status.total, 2);
    assert_eq!(status.idle, 2);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.max, 10);
    assert_eq!(connector.live_connections(), 2);

    pool.close().await;
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_builder_connects() {
    let connector = MockConnector::new();
    let pool = Pool::builder()
        .pool_config(test_config())
        .connector(connector.clone())
        .min_connections(1)
        .max_connections(3)
        .build()
        .await
        .unwrap();

    assert_eq!(pool.status().max, 3);
    assert_eq!(connector.connections_opened(), 1);
    pool.close().await;
}

// =============================================================================
// Acquire and release
// =============================================================================

#[tokio::test]
async fn test_released_connection_is_reused() {
    let connector = MockConnector::new();
    let pool = connect(test_config(), &connector).await;

    let conn = pool.acquire().await.unwrap();
    let first_id = conn.metadata().id;
    assert_eq!(pool.status().in_use, 1);
    conn.release();

    let conn = pool.acquire().await.unwrap();
    assert_eq!(conn.metadata().id, first_id);
    assert_eq!(conn.metadata().use_count, 3);
    drop(conn);

    assert_eq!(connector.connections_opened(), 1);
    assert_eq!(pool.status().in_use, 0);
    pool.close().await;
}

#[tokio::test]
async fn test_acquire_beyond_max_times_out() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(2), &connector).await;

    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    assert!(pool.status().is_at_capacity());

    let err = pool
        .acquire_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));
    assert!(err.is_transient());
    assert_eq!(pool.metrics().checkouts_failed, 1);
    assert_eq!(connector.connections_opened(), 2);

    pool.close().await;
}

#[tokio::test]
async fn test_waiter_is_served_on_release() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(1), &connector).await;

    let held = pool.acquire().await.unwrap();
    let mut waiter = tokio_test::task::spawn(pool.acquire());
    assert_pending!(waiter.poll());

    drop(held);
    assert!(waiter.is_woken());
    let conn = assert_ready_ok!(waiter.poll());

    assert_eq!(pool.status().in_use, 1);
    assert_eq!(connector.connections_opened(), 1);
    drop(conn);
    pool.close().await;
}

#[tokio::test]
async fn test_try_acquire_never_dials() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(2), &connector).await;

    let conn = pool.try_acquire().unwrap().expect("idle connection");
    assert!(pool.try_acquire().unwrap().is_none());
    drop(conn);

    assert!(pool.try_acquire().unwrap().is_some());
    assert_eq!(connector.connections_opened(), 1);
    pool.close().await;
}

#[tokio::test]
async fn test_dropped_acquire_does_not_leak() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(2), &connector).await;
    let held = pool.acquire().await.unwrap();

    connector.set_connect_delay(Duration::from_millis(500));
    let abandoned = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
    assert!(abandoned.is_err());

    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.in_use, 1);
    assert_consistent(status);

    connector.set_connect_delay(Duration::ZERO);
    drop(held);
    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    assert_eq!(pool.status().total, 2);

    pool.close().await;
}

#[tokio::test]
async fn test_acquire_deadline_covers_dial() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(2), &connector).await;
    let held = pool.acquire().await.unwrap();

    connector.set_connect_delay(Duration::from_millis(500));
    let started = tokio::time::Instant::now();
    let err = pool
        .acquire_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(pool.metrics().checkouts_failed, 1);

    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.in_use, 1);
    assert_consistent(status);

    drop(held);
    pool.close().await;
}

#[tokio::test]
async fn test_broken_connection_is_replaced() {
    let connector = MockConnector::new();
    let pool = connect(test_config(), &connector).await;

    connector.break_connections();
    let mut conn = pool.acquire().await.unwrap();
    assert_ok!(conn.ping().await);
    drop(conn);

    assert_eq!(connector.connections_opened(), 2);
    assert_eq!(pool.status().total, 1);
    eventually(|| connector.live_connections() == 1).await;
    pool.close().await;
}

#[tokio::test]
async fn test_detach_frees_slot() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(1), &connector).await;

    let conn = pool.acquire().await.unwrap();
    let raw = conn.detach().expect("connection");
    assert_eq!(pool.status().total, 0);

    let _next = pool.acquire().await.unwrap();
    assert_eq!(connector.connections_opened(), 2);

    raw.close().await.unwrap();
    pool.close().await;
}

// =============================================================================
// Pool-direct statements
// =============================================================================

#[tokio::test]
async fn test_pool_direct_statements() {
    let connector = MockConnector::new();
    connector.with_rows(
        "SELECT COUNT(*) FROM users",
        single_column("count", vec![Value::Int(3)]),
    );
    let pool = connect(test_config().min_connections(2), &connector).await;

    let count: i64 = pool
        .query_one("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap()
        .get(0)
        .unwrap();
    assert_eq!(count, 3);

    let rows = pool.query("SELECT id FROM users", &[]).await.unwrap();
    assert!(rows.is_empty());

    let affected = pool
        .execute("UPDATE users SET last_login = now() WHERE id = $1", &[Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.total, 2);
    assert_eq!(connector.statements().len(), 3);

    pool.close().await;
}

#[tokio::test]
async fn test_pool_direct_query_holds_lease_while_running() {
    let connector = MockConnector::new();
    let pool = connect(test_config(), &connector).await;

    connector.pause_statements();
    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.query("SELECT pg_sleep(1)", &[]).await }
    });

    eventually(|| pool.status().in_use == 1).await;
    connector.resume_statements();
    assert_ok!(running.await.unwrap());

    assert_eq!(pool.status().in_use, 0);
    pool.close().await;
}

#[tokio::test]
async fn test_statement_error_returns_connection() {
    let connector = MockConnector::new();
    connector.fail_statement("SELECT * FROM missing", "relation \"missing\" does not exist");
    let pool = connect(test_config(), &connector).await;

    let err = pool.query("SELECT * FROM missing", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
    assert!(!err.is_transient());

    let err = pool.query_one("SELECT 1 WHERE false", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, 1);
    pool.close().await;
}

// =============================================================================
// Status under load
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_stays_consistent_under_load() {
    let connector = MockConnector::new();
    let config = test_config().min_connections(1).max_connections(4);
    let pool = connect(config, &connector).await;

    let mut workers = Vec::new();
    for i in 0..32 {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await?;
            conn.execute("UPDATE counters SET n = n + 1 WHERE id = $1", &[Value::from(i)])
                .await?;
            tokio::task::yield_now().await;
            drop(conn);
            pool.query("SELECT n FROM counters", &[]).await
        }));
    }

    let sampler = tokio::spawn({
        let pool = pool.clone();
        async move {
            for _ in 0..200 {
                assert_consistent(pool.status());
                tokio::task::yield_now().await;
            }
        }
    });

    for worker in workers {
        assert_ok!(worker.await.unwrap());
    }
    sampler.await.unwrap();

    let status = pool.status();
    assert_consistent(status);
    assert_eq!(status.in_use, 0);
    assert!(connector.connections_opened() <= 4);
    assert_eq!(pool.metrics().checkouts_failed, 0);

    pool.close().await;
    assert_eq!(connector.live_connections(), 0);
}

// =============================================================================
// Maintenance
// =============================================================================

#[tokio::test]
async fn test_maintenance_closes_expired_connections() {
    let connector = MockConnector::new();
    let config = test_config()
        .max_lifetime(Duration::from_millis(50))
        .health_check_period(Duration::from_secs(3600));
    let pool = connect(config, &connector).await;
    assert_eq!(pool.status().total, 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    pool.run_maintenance().await;

    assert_eq!(pool.status().total, 0);
    assert_eq!(pool.metrics().lifetime_expired, 1);
    assert_eq!(connector.live_connections(), 0);
    pool.close().await;
}

#[tokio::test]
async fn test_maintenance_keeps_min_when_reaping_idle() {
    let connector = MockConnector::new();
    let config = test_config()
        .min_connections(1)
        .max_connections(3)
        .max_idle_time(Duration::from_millis(50))
        .health_check_period(Duration::from_secs(3600));
    let pool = connect(config, &connector).await;

    let leases = vec![
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
    ];
    drop(leases);
    assert_eq!(pool.status().idle, 3);

    tokio::time::sleep(Duration::from_millis(80)).await;
    pool.run_maintenance().await;

    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.idle, 1);
    assert_eq!(pool.metrics().idle_expired, 2);
    pool.close().await;
}

#[tokio::test]
async fn test_background_maintenance_replaces_expired_connections() {
    let connector = MockConnector::new();
    let config = test_config()
        .min_connections(1)
        .max_lifetime(Duration::from_millis(40))
        .health_check_period(Duration::from_millis(20));
    let pool = connect(config, &connector).await;

    eventually(|| pool.metrics().lifetime_expired >= 1 && connector.connections_opened() >= 2)
        .await;

    pool.close().await;
    eventually(|| connector.live_connections() == 0).await;
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_closed_pool_rejects_everything() {
    let connector = MockConnector::new();
    let pool = connect(test_config().min_connections(2), &connector).await;

    pool.close().await;
    pool.close().await;

    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    assert!(matches!(pool.try_acquire(), Err(PoolError::Closed)));
    assert!(matches!(pool.query("SELECT 1", &[]).await, Err(PoolError::Closed)));
    assert!(matches!(pool.execute("SELECT 1", &[]).await, Err(PoolError::Closed)));
    assert!(matches!(pool.ping().await, Err(PoolError::Closed)));

    let status = pool.status();
    assert_eq!(status.total, 0);
    assert_eq!(status.idle, 0);
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_close_fails_pending_waiters() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(1), &connector).await;
    let held = pool.acquire().await.unwrap();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await }
    });
    tokio::task::yield_now().await;

    pool.close().await;
    assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));
    drop(held);
}

#[tokio::test]
async fn test_close_during_dial_fails_acquire() {
    let connector = MockConnector::new();
    let pool = connect(test_config().max_connections(2), &connector).await;
    let held = pool.acquire().await.unwrap();

    connector.set_connect_delay(Duration::from_millis(100));
    let dialing = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.close().await;
    assert!(matches!(dialing.await.unwrap(), Err(PoolError::Closed)));
    assert_eq!(pool.metrics().checkouts_failed, 1);

    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.in_use, 1);

    drop(held);
    assert_eq!(pool.status().total, 0);
    eventually(|| connector.live_connections() == 0).await;
}

#[tokio::test]
async fn test_lease_outliving_close_is_invalidated() {
    let connector = MockConnector::new();
    let pool = connect(test_config(), &connector).await;

    let mut conn = pool.acquire().await.unwrap();
    pool.close().await;

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(connector.live_connections(), 1);

    drop(conn);
    assert_eq!(pool.status().in_use, 0);
    eventually(|| connector.live_connections() == 0).await;
}
