use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::services::config::OutboxConfig;
use crate::services::queue_store::QueueStore;
use crate::services::status_bridge::StatusBridge;
use crate::services::sync_engine::{HttpSubmitApi, SubmitApi, SyncEngine};
use crate::services::triggers::{self, WorkerScheduler};
use crate::services::worker::{OutboxWorker, WorkerHandle};

/// Wired-up offline outbox: store, engine, worker and bridge, constructed
/// once per process. Dropping the state aborts the background tasks and
/// drops every handle, which ends the worker loop.
pub struct AppState {
    pub store: Arc<QueueStore>,
    pub engine: Arc<SyncEngine>,
    pub worker: WorkerHandle,
    pub bridge: Arc<RwLock<StatusBridge>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for AppState {
    fn drop(&mut self) {
        // The forwarding and periodic tasks hold engine/bridge Arcs and
        // would otherwise outlive the state.
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl AppState {
    /// Start against the real HTTP endpoint from the config.
    pub async fn start(config: OutboxConfig, initially_online: bool) -> Result<Self> {
        let api = Arc::new(HttpSubmitApi::new(
            config.endpoint_url.clone(),
            config.request_timeout(),
        )?);
        Self::start_with_api(config, api, initially_online).await
    }

    /// Start with an injected submission API (tests, alternative transports).
    pub async fn start_with_api(
        config: OutboxConfig,
        api: Arc<dyn SubmitApi>,
        initially_online: bool,
    ) -> Result<Self> {
        let store = Arc::new(QueueStore::open(&config.database_path()).await?);
        let engine = Arc::new(SyncEngine::new(store.clone(), api));

        let worker = OutboxWorker::spawn(store.clone(), engine.clone())
            .with_reply_timeout(config.reply_timeout());
        let scheduler = Arc::new(WorkerScheduler::new(worker.clone()));

        let bridge = Arc::new(RwLock::new(
            StatusBridge::new(worker.clone(), scheduler, initially_online).await,
        ));

        // Forward engine lifecycle events into the bridge.
        let mut events = engine.subscribe();
        let bridge_for_events = bridge.clone();
        let mut tasks = vec![tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                bridge_for_events
                    .write()
                    .await
                    .handle_sync_event(event)
                    .await;
            }
        })];

        if let Some(interval) = config.periodic_sync() {
            tasks.push(triggers::spawn_periodic(engine.clone(), interval));
        }

        log::info!(
            "Outbox started (endpoint {}, db {})",
            config.endpoint_url,
            config.database_path().display()
        );

        Ok(Self {
            store,
            engine,
            worker,
            bridge,
            tasks,
        })
    }
}
