// Service layer - durable queue, sync orchestration and foreground bridge

pub mod config;
pub mod outbox_types;
pub mod queue_store;
pub mod status_bridge;
pub mod sync_engine;
pub mod triggers;
pub mod worker;

pub use config::{ConfigService, OutboxConfig};
pub use queue_store::QueueStore;
pub use status_bridge::StatusBridge;
pub use sync_engine::{HttpSubmitApi, SyncEngine};
pub use triggers::{DirectScheduler, WorkerScheduler};
pub use worker::{OutboxWorker, WorkerHandle};
