//! Progress observability: generation lifecycle events on an in-process bus.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: String,
    pub session: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl ProgressEvent {
    /// User-facing notices carry `{ level, message }`.
    pub fn is_notice(&self) -> bool {
        self.event_type == "notice"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Broadcast bus; emitting with no subscribers is not an error.
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
    seq: Arc<AtomicU64>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, session: &str, event_type: &str, data: Value) {
        let event = ProgressEvent {
            ts: now_millis().to_string(),
            session: session.to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            event_type: event_type.to_string(),
            data,
        };
        let _ = self.sender.send(event);
    }

    pub fn notice(&self, session: &str, level: NoticeLevel, message: impl Into<String>) {
        self.emit(
            session,
            "notice",
            json!({ "level": level, "message": message.into() }),
        );
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
