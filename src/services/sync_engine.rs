//! Sync engine: drains the durable queue against the remote submission
//! endpoint, one message at a time, in insertion order.
//!
//! Outcome handling per message: 2xx deletes the record, 401 halts the whole
//! run (a refreshed credential is needed before further progress means
//! anything), any other failure leaves the record queued and moves on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::error::Result;
use crate::services::outbox_types::{QueuedMessage, SubmitBody, SubmitStatus, SyncEvent};
use crate::services::queue_store::QueueStore;

/// Submission seam so the engine is testable without a live server.
#[async_trait]
pub trait SubmitApi: Send + Sync {
    /// Submit one queued message. `Err` means a transport-level failure;
    /// HTTP-level outcomes come back as `SubmitStatus`.
    async fn submit(&self, message: &QueuedMessage) -> Result<SubmitStatus>;
}

/// reqwest-backed submission client.
pub struct HttpSubmitApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmitApi {
    pub fn new(endpoint: String, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SubmitApi for HttpSubmitApi {
    async fn submit(&self, message: &QueuedMessage) -> Result<SubmitStatus> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&message.auth_token)
            .json(&SubmitBody::from_message(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(SubmitStatus::Accepted)
        } else if status.as_u16() == 401 {
            Ok(SubmitStatus::AuthExpired)
        } else {
            Ok(SubmitStatus::Rejected(status.as_u16()))
        }
    }
}

/// Terminal state of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Queue was empty; nothing emitted.
    Idle,
    Completed { success: usize, failed: usize },
    /// Run halted on a 401; remaining messages untouched.
    AuthExpired,
    /// Another run holds the lock; this trigger was coalesced.
    AlreadyRunning,
    /// Unexpected storage failure mid-run; `SyncEvent::Error` was emitted.
    Failed,
}

pub struct SyncEngine {
    store: Arc<QueueStore>,
    api: Arc<dyn SubmitApi>,
    events: broadcast::Sender<SyncEvent>,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<QueueStore>, api: Arc<dyn SubmitApi>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            api,
            events,
            run_lock: Mutex::new(()),
        }
    }

    /// Subscribe to lifecycle events for runs started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Drain the queue once. At most one run is active at a time; a trigger
    /// arriving mid-run is coalesced instead of queued.
    pub async fn run(&self) -> RunOutcome {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::debug!("Sync already in progress, coalescing trigger");
                return RunOutcome::AlreadyRunning;
            }
        };

        match self.drain().await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Sync run failed: {}", e);
                self.emit(SyncEvent::Error {
                    error: e.to_string(),
                });
                RunOutcome::Failed
            }
        }
    }

    async fn drain(&self) -> Result<RunOutcome> {
        let pending = self.store.list_all().await?;
        if pending.is_empty() {
            return Ok(RunOutcome::Idle);
        }

        log::info!("Starting sync of {} pending messages", pending.len());
        self.emit(SyncEvent::Started {
            count: pending.len(),
        });

        let mut success = 0usize;
        let mut failed = 0usize;

        for message in &pending {
            match self.api.submit(message).await {
                Ok(SubmitStatus::Accepted) => {
                    self.store.delete_by_id(message.id).await?;
                    success += 1;
                    log::debug!("Message {} synced", message.id);
                }
                Ok(SubmitStatus::AuthExpired) => {
                    log::warn!(
                        "Credential expired at message {}, halting run ({} remaining)",
                        message.id,
                        pending.len() - success - failed
                    );
                    self.emit(SyncEvent::AuthExpired {
                        message_id: message.id,
                    });
                    return Ok(RunOutcome::AuthExpired);
                }
                Ok(SubmitStatus::Rejected(status)) => {
                    failed += 1;
                    log::warn!("Message {} rejected with HTTP {}", message.id, status);
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("Message {} submission failed: {}", message.id, e);
                }
            }
        }

        log::info!("Sync completed: {} success, {} failed", success, failed);
        self.emit(SyncEvent::Completed { success, failed });
        Ok(RunOutcome::Completed { success, failed })
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine; events are best-effort notifications.
        let _ = self.events.send(event);
    }
}
