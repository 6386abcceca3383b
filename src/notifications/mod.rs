//! Delivery contracts for the collaborators that live outside this service:
//! user notifications, the audit trail, and real-time dashboard pushes.
//!
//! All three are fire-and-forget from the core's point of view. A committed
//! stock or status mutation is never reversed because a sink failed; the
//! event loop logs the failure and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::auth::Role;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Addressing for a user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTarget {
    User(Uuid),
    Role(Role),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RestockRequest,
    RestockStatus,
    LowStock,
    StockUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// One entry for the external audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub shop_id: Option<Uuid>,
    pub message: String,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        target: NotificationTarget,
        notification: Notification,
    ) -> Result<(), SinkError>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), SinkError>;
}

#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn broadcast(&self, event_name: &str, payload: Value) -> Result<(), SinkError>;
}

/// The sinks a running instance dispatches side effects to.
#[derive(Clone)]
pub struct SinkSet {
    pub notifications: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    pub broadcast: Arc<dyn BroadcastSink>,
}

/// Default sink when no delivery transport is wired up: structured logs only.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(
        &self,
        target: NotificationTarget,
        notification: Notification,
    ) -> Result<(), SinkError> {
        info!(
            target = ?target,
            kind = ?notification.kind,
            message = %notification.message,
            "notification dispatched"
        );
        Ok(())
    }
}

pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
        info!(
            action = %record.action,
            entity = %record.entity,
            entity_id = %record.entity_id,
            actor_id = ?record.actor_id,
            message = %record.message,
            "audit record"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub payload: Value,
}

/// In-process pub/sub registry for live-dashboard pushes. Connected clients
/// subscribe through `subscribe()`; a multi-instance deployment swaps this
/// for a shared-store implementation of `BroadcastSink`.
pub struct ChannelBroadcastSink {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl ChannelBroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl BroadcastSink for ChannelBroadcastSink {
    async fn broadcast(&self, event_name: &str, payload: Value) -> Result<(), SinkError> {
        // A send error only means no subscriber is currently connected.
        let _ = self.tx.send(BroadcastMessage {
            event: event_name.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Capturing sinks for tests and local inspection.
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryNotificationSink {
        pub sent: Mutex<Vec<(NotificationTarget, Notification)>>,
    }

    #[async_trait]
    impl NotificationSink for InMemoryNotificationSink {
        async fn notify(
            &self,
            target: NotificationTarget,
            notification: Notification,
        ) -> Result<(), SinkError> {
            self.sent
                .lock()
                .expect("notification sink lock poisoned")
                .push((target, notification));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct InMemoryAuditSink {
        pub records: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditSink for InMemoryAuditSink {
        async fn record(&self, record: AuditRecord) -> Result<(), SinkError> {
            self.records
                .lock()
                .expect("audit sink lock poisoned")
                .push(record);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_sink_captures_notifications() {
        let sink = InMemoryNotificationSink::default();
        sink.notify(
            NotificationTarget::Role(Role::Admin),
            Notification::new(NotificationKind::LowStock, "stock is low", json!({})),
        )
        .await
        .unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NotificationTarget::Role(Role::Admin));
    }

    #[tokio::test]
    async fn channel_broadcast_reaches_subscribers() {
        let sink = ChannelBroadcastSink::new(8);
        let mut rx = sink.subscribe();

        sink.broadcast("stock_update", json!({"delta": -5}))
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event, "stock_update");
        assert_eq!(msg.payload["delta"], -5);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_not_an_error() {
        let sink = ChannelBroadcastSink::new(8);
        assert!(sink.broadcast("stock_update", json!({})).await.is_ok());
    }
}
