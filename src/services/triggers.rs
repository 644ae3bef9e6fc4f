//! Trigger layer: decides when the sync engine runs.
//!
//! Four paths feed into the same engine: the reconnect edge (bridge calls
//! `request_sync`), the deferred facility itself (`TriggerSync` handled by
//! the worker), a periodic wake, and explicit manual requests. Backoff and
//! retry pacing belong to the platform underneath, not here; the engine's
//! run lock is the only dedup policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::services::sync_engine::SyncEngine;
use crate::services::worker::WorkerHandle;

/// Injected deferred-sync capability. Callers treat failures as
/// best-effort: log and move on, never propagate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncScheduler: Send + Sync {
    async fn request_sync(&self) -> Result<()>;
}

/// Default scheduler: routes the request through the worker's control
/// channel so the worker decides when to run (and defers while installed).
pub struct WorkerScheduler {
    worker: WorkerHandle,
}

impl WorkerScheduler {
    pub fn new(worker: WorkerHandle) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl SyncScheduler for WorkerScheduler {
    async fn request_sync(&self) -> Result<()> {
        self.worker.trigger_sync().await
    }
}

/// Fallback scheduler for hosts without a worker channel: invokes the
/// engine directly, fire-and-forget.
pub struct DirectScheduler {
    engine: Arc<SyncEngine>,
}

impl DirectScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SyncScheduler for DirectScheduler {
    async fn request_sync(&self) -> Result<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.run().await;
        });
        Ok(())
    }
}

/// Periodic wake loop. Same shape as the other background queue
/// processors: sleep, then drain whatever is pending.
pub fn spawn_periodic(engine: Arc<SyncEngine>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Periodic sync wake every {:?}", interval);
        loop {
            tokio::time::sleep(interval).await;
            engine.run().await;
        }
    })
}
