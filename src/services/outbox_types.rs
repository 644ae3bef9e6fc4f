use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Stored types ───────────────────────────────────────────────

/// Lifecycle status of a queued record. Success deletes the row instead of
/// transitioning it, so `Pending` is currently the only variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MessageStatus {
    Pending,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            _ => None,
        }
    }
}

/// One chat message awaiting delivery. Created by the enqueue handler,
/// drained by the sync engine, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    /// Store-assigned, unique, monotonically increasing, never reused.
    pub id: i64,
    pub content: String,
    pub conversation_id: String,
    /// Bearer credential snapshot taken at enqueue time, not refreshed.
    pub auth_token: String,
    /// Insertion time stamped by the store clock.
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Per-conversation cache row: last enqueue activity, kept for future
/// filtering. Not consulted during a drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCacheEntry {
    pub conversation_id: String,
    pub last_queued_at: DateTime<Utc>,
    pub last_content: String,
}

// ── Wire protocol types ────────────────────────────────────────

/// Body posted to the remote submission endpoint. Field names follow the
/// server contract, so no rename here. `offline_id` and `offline_timestamp`
/// let the server deduplicate and audit replayed messages.
#[derive(Debug, Serialize)]
pub struct SubmitBody<'a> {
    pub message: &'a str,
    pub conversation_id: &'a str,
    pub offline_id: i64,
    pub offline_timestamp: i64,
}

impl<'a> SubmitBody<'a> {
    pub fn from_message(msg: &'a QueuedMessage) -> Self {
        Self {
            message: &msg.content,
            conversation_id: &msg.conversation_id,
            offline_id: msg.id,
            offline_timestamp: msg.timestamp.timestamp_millis(),
        }
    }
}

/// Per-message outcome of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Any 2xx: the server accepted the message.
    Accepted,
    /// 401: the captured credential is no longer valid.
    AuthExpired,
    /// Any other non-2xx status; the message stays queued.
    Rejected(u16),
}

// ── Event types ────────────────────────────────────────────────

/// Lifecycle events emitted by the sync engine during a run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SyncEvent {
    Started { count: usize },
    Completed { success: usize, failed: usize },
    AuthExpired { message_id: i64 },
    Error { error: String },
}

/// UI-facing notifications republished by the status bridge.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum UiEvent {
    Online,
    Offline,
    SyncComplete { success: usize, failed: usize },
    AuthExpired,
}

/// Discriminant used to key listener registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiEventKind {
    Online,
    Offline,
    SyncComplete,
    AuthExpired,
}

impl UiEvent {
    /// Payload form handed to the rendering layer.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn kind(&self) -> UiEventKind {
        match self {
            UiEvent::Online => UiEventKind::Online,
            UiEvent::Offline => UiEventKind::Offline,
            UiEvent::SyncComplete { .. } => UiEventKind::SyncComplete,
            UiEvent::AuthExpired => UiEventKind::AuthExpired,
        }
    }
}
