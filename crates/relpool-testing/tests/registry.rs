//! Process-wide registry integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use relpool::{ErrorKind, PoolError, PoolRegistry, PoolState};
use relpool_testing::{MockConnector, test_config};
use tokio_test::assert_ok;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_yields_one_pool() {
    let registry = Arc::new(PoolRegistry::new());
    let connector = MockConnector::new();

    let mut callers = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let connector = connector.clone();
        callers.push(tokio::spawn(async move {
            registry
                .get_or_create(test_config(), Arc::new(connector))
                .await
        }));
    }

    let mut pools = Vec::new();
    for caller in callers {
        pools.push(caller.await.unwrap().unwrap());
    }

    let first = &pools[0];
    assert!(pools.iter().all(|pool| pool.ptr_eq(first)));
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(registry.state(), PoolState::Ready);

    registry.close().await;
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_failed_creation_can_be_retried() {
    let registry = PoolRegistry::new();
    let connector = MockConnector::unreachable();

    let err = registry
        .get_or_create(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(registry.state(), PoolState::Uninitialized);
    assert!(registry.get().is_none());
    assert_eq!(connector.live_connections(), 0);

    connector.set_reachable(true);
    let pool = registry
        .get_or_create(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap();
    assert_eq!(registry.state(), PoolState::Ready);
    assert!(registry.get().unwrap().ptr_eq(&pool));

    registry.close().await;
}

#[tokio::test]
async fn test_later_configuration_is_ignored() {
    let registry = PoolRegistry::new();
    let connector = MockConnector::new();

    let pool = registry
        .get_or_create(test_config().max_connections(4), Arc::new(connector.clone()))
        .await
        .unwrap();
    let again = registry
        .get_or_create(test_config().max_connections(20), Arc::new(connector.clone()))
        .await
        .unwrap();

    assert!(pool.ptr_eq(&again));
    assert_eq!(again.status().max, 4);
    assert_eq!(connector.connect_attempts(), 1);

    registry.close().await;
}

#[tokio::test]
async fn test_closed_registry_refuses_requests() {
    let registry = PoolRegistry::new();
    let connector = MockConnector::new();
    let pool = registry
        .get_or_create(test_config().min_connections(2), Arc::new(connector.clone()))
        .await
        .unwrap();
    assert_ok!(pool.ping().await);

    registry.close().await;
    registry.close().await;

    assert_eq!(registry.state(), PoolState::Closed);
    assert!(pool.is_closed());
    assert!(registry.get().is_none());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));

    let err = registry
        .get_or_create(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Closed));
    assert_eq!(connector.connect_attempts(), 2);
    assert_eq!(connector.live_connections(), 0);
}

#[tokio::test]
async fn test_close_before_creation() {
    let registry = PoolRegistry::new();
    registry.close().await;

    let connector = MockConnector::new();
    let err = registry
        .get_or_create(test_config(), Arc::new(connector.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Closed));
    assert_eq!(connector.connect_attempts(), 0);
}
