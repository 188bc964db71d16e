//! Background maintenance task.
//!
//! Runs once per health-check period for as long as the pool is open. The
//! task only holds a weak reference so it never keeps a dropped pool alive.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pool::PoolInner;

pub(crate) fn spawn(pool: Weak<PoolInner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;

            let Some(inner) = pool.upgrade() else {
                break;
            };
            if inner.is_closed() {
                break;
            }

            tracing::trace!("running pool maintenance");
            inner.run_maintenance().await;
        }

        tracing::debug!("pool maintenance task stopped");
    })
}
