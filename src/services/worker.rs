//! Background outbox worker and its control channel.
//!
//! The worker owns the durable store and the sync engine and serves a small
//! request protocol over an mpsc channel. Every request that expects an
//! answer carries its own single-use oneshot reply channel, so responses are
//! correlated 1:1 with requests even with many outstanding callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{OutboxError, Result};
use crate::services::queue_store::QueueStore;
use crate::services::sync_engine::SyncEngine;

const CHANNEL_CAPACITY: usize = 32;

/// Control-channel requests, keyed by variant.
pub enum WorkerRequest {
    QueueMessage {
        request_id: Uuid,
        content: String,
        conversation_id: String,
        token: String,
        reply: oneshot::Sender<Result<i64>>,
    },
    CheckPending {
        request_id: Uuid,
        reply: oneshot::Sender<Result<u64>>,
    },
    ClearPending {
        request_id: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Ask the worker to schedule a sync run. No reply.
    TriggerSync,
    /// Promote an `Installed` worker to `Active` immediately. No reply.
    SkipWaiting,
}

/// Worker lifecycle phase. A freshly deployed worker may sit `Installed`
/// while an older instance still serves existing callers; sync triggers are
/// deferred until activation, but enqueue and queries already work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerPhase {
    Installed,
    Active,
}

/// Background worker task. Owns the store and engine; single-threaded
/// cooperative handling, one request at a time.
pub struct OutboxWorker {
    store: Arc<QueueStore>,
    engine: Arc<SyncEngine>,
    rx: mpsc::Receiver<WorkerRequest>,
    phase: WorkerPhase,
    sync_deferred: bool,
}

impl OutboxWorker {
    /// Spawn an active worker; the returned handle is the only way in.
    pub fn spawn(store: Arc<QueueStore>, engine: Arc<SyncEngine>) -> WorkerHandle {
        Self::spawn_with_phase(store, engine, WorkerPhase::Active)
    }

    /// Spawn a worker that waits for `SkipWaiting` before running syncs.
    pub fn spawn_installed(store: Arc<QueueStore>, engine: Arc<SyncEngine>) -> WorkerHandle {
        Self::spawn_with_phase(store, engine, WorkerPhase::Installed)
    }

    fn spawn_with_phase(
        store: Arc<QueueStore>,
        engine: Arc<SyncEngine>,
        phase: WorkerPhase,
    ) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = Self {
            store,
            engine,
            rx,
            phase,
            sync_deferred: false,
        };
        tokio::spawn(worker.run());
        WorkerHandle {
            tx,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    async fn run(mut self) {
        log::info!("Outbox worker started ({:?})", self.phase);
        while let Some(request) = self.rx.recv().await {
            self.handle(request).await;
        }
        log::info!("Outbox worker stopping, all handles dropped");
    }

    async fn handle(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::QueueMessage {
                request_id,
                content,
                conversation_id,
                token,
                reply,
            } => {
                let result = self.enqueue(&content, &conversation_id, &token).await;
                match &result {
                    Ok(id) => log::info!("[{}] Message queued with id {}", request_id, id),
                    Err(e) => log::error!("[{}] Enqueue failed: {}", request_id, e),
                }
                let _ = reply.send(result);
            }
            WorkerRequest::CheckPending { request_id, reply } => {
                let result = self.store.count().await;
                if let Err(e) = &result {
                    log::error!("[{}] Pending count query failed: {}", request_id, e);
                }
                let _ = reply.send(result);
            }
            WorkerRequest::ClearPending { request_id, reply } => {
                let result = self.store.clear_all().await;
                match &result {
                    Ok(()) => log::info!("[{}] Pending queue cleared", request_id),
                    Err(e) => log::error!("[{}] Clear failed: {}", request_id, e),
                }
                let _ = reply.send(result);
            }
            WorkerRequest::TriggerSync => self.schedule_sync(),
            WorkerRequest::SkipWaiting => {
                if self.phase == WorkerPhase::Installed {
                    self.phase = WorkerPhase::Active;
                    log::info!("Worker activated by skip-waiting request");
                    if std::mem::take(&mut self.sync_deferred) {
                        self.schedule_sync();
                    }
                }
            }
        }
    }

    async fn enqueue(&mut self, content: &str, conversation_id: &str, token: &str) -> Result<i64> {
        let id = self.store.insert(content, conversation_id, token).await?;

        // Cache upkeep is best-effort; the queued row is already durable.
        if let Err(e) = self.store.touch_conversation(conversation_id, content).await {
            log::warn!("Conversation cache update failed: {}", e);
        }

        // The platform retries at its own pace; we just ask.
        self.schedule_sync();
        Ok(id)
    }

    fn schedule_sync(&mut self) {
        match self.phase {
            WorkerPhase::Installed => {
                self.sync_deferred = true;
                log::debug!("Sync request deferred until worker activation");
            }
            WorkerPhase::Active => {
                let engine = self.engine.clone();
                tokio::spawn(async move {
                    engine.run().await;
                });
            }
        }
    }
}

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable foreground client for the control channel. Calls fail fast
/// with `ChannelUnavailable` when no worker is listening; they never hang.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
    reply_timeout: Duration,
}

impl WorkerHandle {
    /// Handle with no worker behind it, for hosts where the background
    /// worker was never installed. Every request fails fast with
    /// `ChannelUnavailable` instead of hanging.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self {
            tx,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub async fn queue_message(
        &self,
        content: &str,
        conversation_id: &str,
        token: &str,
    ) -> Result<i64> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerRequest::QueueMessage {
            request_id: Uuid::new_v4(),
            content: content.to_string(),
            conversation_id: conversation_id.to_string(),
            token: token.to_string(),
            reply,
        })
        .await?;
        self.await_reply(rx).await
    }

    pub async fn check_pending(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerRequest::CheckPending {
            request_id: Uuid::new_v4(),
            reply,
        })
        .await?;
        self.await_reply(rx).await
    }

    pub async fn clear_pending(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerRequest::ClearPending {
            request_id: Uuid::new_v4(),
            reply,
        })
        .await?;
        self.await_reply(rx).await
    }

    /// Fire-and-forget sync request.
    pub async fn trigger_sync(&self) -> Result<()> {
        self.send(WorkerRequest::TriggerSync).await
    }

    /// Fire-and-forget activation request.
    pub async fn skip_waiting(&self) -> Result<()> {
        self.send(WorkerRequest::SkipWaiting).await
    }

    async fn send(&self, request: WorkerRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| OutboxError::ChannelUnavailable("no worker is running".to_string()))
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OutboxError::ChannelUnavailable(
                "worker dropped the request".to_string(),
            )),
            Err(_) => Err(OutboxError::ChannelTimeout),
        }
    }
}
