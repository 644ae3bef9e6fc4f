//! Foreground connectivity and status bridge.
//!
//! Tracks the platform's online/offline signal and the worker's sync
//! lifecycle, keeps a cached pending count, and republishes both as typed
//! UI notifications through a subscribe/unsubscribe registry. The cached
//! count is never the source of truth: every sync completion re-reads it
//! from the store through the control channel.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::services::outbox_types::{SyncEvent, UiEvent, UiEventKind};
use crate::services::triggers::SyncScheduler;
use crate::services::worker::WorkerHandle;

type Listener = Box<dyn Fn(&UiEvent) + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

pub struct StatusBridge {
    worker: WorkerHandle,
    scheduler: Arc<dyn SyncScheduler>,
    is_online: bool,
    pending_count: u64,
    listeners: HashMap<UiEventKind, Vec<(ListenerId, Listener)>>,
    next_listener: u64,
}

impl StatusBridge {
    /// Build the bridge from the platform's initial connectivity signal and
    /// the store's current count. A failed count query starts at zero; the
    /// next completed sync reconciles it.
    pub async fn new(
        worker: WorkerHandle,
        scheduler: Arc<dyn SyncScheduler>,
        initially_online: bool,
    ) -> Self {
        let pending_count = match worker.check_pending().await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Initial pending count unavailable: {}", e);
                0
            }
        };

        Self {
            worker,
            scheduler,
            is_online: initially_online,
            pending_count,
            listeners: HashMap::new(),
            next_listener: 0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.is_online
    }

    pub fn pending_count(&self) -> u64 {
        self.pending_count
    }

    /// Register a listener for one event kind. Multiple independent
    /// listeners per kind are supported.
    pub fn subscribe<F>(&mut self, kind: UiEventKind, listener: F) -> ListenerId
    where
        F: Fn(&UiEvent) + Send + Sync + 'static,
    {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        for entries in self.listeners.values_mut() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Feed a connectivity signal. Only edges matter: repeated same-state
    /// signals are ignored, so one reconnect produces one sync request.
    pub async fn set_online(&mut self, online: bool) {
        if online == self.is_online {
            return;
        }
        self.is_online = online;

        if online {
            log::info!("Connection restored, {} messages pending", self.pending_count);
            self.notify(&UiEvent::Online);
            // Best-effort; the platform may refuse registration.
            if let Err(e) = self.scheduler.request_sync().await {
                log::warn!("Sync registration failed: {}", e);
            }
        } else {
            log::info!("Connection lost, queueing messages locally");
            self.notify(&UiEvent::Offline);
        }
    }

    /// Feed a worker lifecycle event.
    pub async fn handle_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Started { count } => {
                log::info!("Sync started for {} messages", count);
            }
            SyncEvent::Completed { success, failed } => {
                self.refresh_pending().await;
                self.notify(&UiEvent::SyncComplete { success, failed });
            }
            SyncEvent::AuthExpired { message_id } => {
                log::warn!("Credential expired during sync of message {}", message_id);
                self.notify(&UiEvent::AuthExpired);
            }
            SyncEvent::Error { error } => {
                log::error!("Sync run error: {}", error);
            }
        }
    }

    /// Enqueue through the control channel, keeping the cached count in
    /// step. Fails fast when no worker is available.
    pub async fn queue_message(
        &mut self,
        content: &str,
        conversation_id: &str,
        token: &str,
    ) -> Result<i64> {
        let id = self.worker.queue_message(content, conversation_id, token).await?;
        self.pending_count += 1;
        Ok(id)
    }

    /// Re-read the pending count from the store.
    pub async fn refresh_pending(&mut self) -> u64 {
        match self.worker.check_pending().await {
            Ok(count) => self.pending_count = count,
            Err(e) => log::warn!("Pending count refresh failed: {}", e),
        }
        self.pending_count
    }

    fn notify(&self, event: &UiEvent) {
        if let Some(entries) = self.listeners.get(&event.kind()) {
            for (_, listener) in entries {
                listener(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::outbox_types::{QueuedMessage, SubmitStatus};
    use crate::services::queue_store::QueueStore;
    use crate::services::sync_engine::{SubmitApi, SyncEngine};
    use crate::services::triggers::MockSyncScheduler;
    use crate::services::worker::OutboxWorker;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct AcceptAll;

    #[async_trait]
    impl SubmitApi for AcceptAll {
        async fn submit(&self, _message: &QueuedMessage) -> Result<SubmitStatus> {
            Ok(SubmitStatus::Accepted)
        }
    }

    async fn make_worker() -> (WorkerHandle, Arc<QueueStore>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(
            QueueStore::open(&tmp.path().join("outbox.db"))
                .await
                .unwrap(),
        );
        let engine = Arc::new(SyncEngine::new(store.clone(), Arc::new(AcceptAll)));
        let handle = OutboxWorker::spawn(store.clone(), engine);
        (handle, store, tmp)
    }

    #[tokio::test]
    async fn test_reconnect_requests_exactly_one_sync() {
        let (worker, store, _tmp) = make_worker().await;
        store.insert("a", "c1", "t").await.unwrap();
        store.insert("b", "c1", "t").await.unwrap();

        let mut scheduler = MockSyncScheduler::new();
        scheduler.expect_request_sync().times(1).returning(|| Ok(()));

        let mut bridge = StatusBridge::new(worker, Arc::new(scheduler), false).await;
        assert_eq!(bridge.pending_count(), 2);

        bridge.set_online(true).await;
        // Duplicate signal, no second request
        bridge.set_online(true).await;
        assert!(bridge.is_online());
    }

    #[tokio::test]
    async fn test_offline_transition_notifies_listeners() {
        let (worker, _store, _tmp) = make_worker().await;
        let scheduler = MockSyncScheduler::new();

        let mut bridge = StatusBridge::new(worker, Arc::new(scheduler), true).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.subscribe(UiEventKind::Offline, move |ev| {
            sink.lock().unwrap().push(ev.clone());
        });

        bridge.set_online(false).await;
        assert!(!bridge.is_online());
        assert_eq!(seen.lock().unwrap().as_slice(), &[UiEvent::Offline]);
    }

    #[tokio::test]
    async fn test_sync_complete_requeries_store() {
        let (worker, store, _tmp) = make_worker().await;
        let scheduler = MockSyncScheduler::new();

        let mut bridge = StatusBridge::new(worker, Arc::new(scheduler), true).await;
        assert_eq!(bridge.pending_count(), 0);

        // Rows appear behind the bridge's back; completion reconciles.
        store.insert("left over", "c1", "t").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.subscribe(UiEventKind::SyncComplete, move |ev| {
            sink.lock().unwrap().push(ev.clone());
        });

        bridge
            .handle_sync_event(SyncEvent::Completed {
                success: 2,
                failed: 1,
            })
            .await;

        assert_eq!(bridge.pending_count(), 1);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[UiEvent::SyncComplete {
                success: 2,
                failed: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_auth_expired_keeps_pending_count() {
        let (worker, store, _tmp) = make_worker().await;
        store.insert("a", "c1", "t").await.unwrap();
        store.insert("b", "c1", "t").await.unwrap();

        let scheduler = MockSyncScheduler::new();
        let mut bridge = StatusBridge::new(worker, Arc::new(scheduler), true).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.subscribe(UiEventKind::AuthExpired, move |ev| {
            sink.lock().unwrap().push(ev.clone());
        });

        bridge
            .handle_sync_event(SyncEvent::AuthExpired { message_id: 1 })
            .await;

        assert_eq!(bridge.pending_count(), 2);
        assert_eq!(seen.lock().unwrap().as_slice(), &[UiEvent::AuthExpired]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (worker, _store, _tmp) = make_worker().await;
        let scheduler = MockSyncScheduler::new();
        let mut bridge = StatusBridge::new(worker, Arc::new(scheduler), true).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bridge.subscribe(UiEventKind::Offline, move |ev| {
            sink.lock().unwrap().push(ev.clone());
        });
        bridge.unsubscribe(id);

        bridge.set_online(false).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
