//! Read-only transition audit
//!
//! Periodically diffs every slot's state against the state seen at the
//! previous scan and logs the changes. Never emits telemetry or recycles.

use fruit_pool::FruitPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Scan the pool every `interval` until the task is aborted
pub async fn run_audit(pool: Arc<FruitPool>, interval: Duration) {
    info!("Transition audit every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for t in pool.scan_transitions() {
            debug!("Audit: slot {} fruit {} {} -> {}", t.slot, t.id, t.from, t.to);
        }
    }
}
