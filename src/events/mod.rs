use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::Role;
use crate::notifications::{
    AuditRecord, Notification, NotificationKind, NotificationTarget, SinkSet,
};

/// Domain events emitted after a mutation has committed. The processing loop
/// fans each one out to the notification, audit, and broadcast sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RestockRequestCreated {
        request_id: Uuid,
        shop_id: Uuid,
        product_id: Uuid,
        requested_amount: i32,
        actor_id: Option<Uuid>,
        manager_id: Option<Uuid>,
        auto_generated: bool,
    },
    RestockRequestStatusChanged {
        request_id: Uuid,
        shop_id: Uuid,
        product_id: Uuid,
        requested_amount: i32,
        previous_status: String,
        new_status: String,
        actor_id: Uuid,
        manager_id: Option<Uuid>,
    },
    RestockRequestHidden {
        request_id: Uuid,
        shop_id: Uuid,
        actor_id: Uuid,
    },
    FactoryStockAdjusted {
        product_id: Uuid,
        previous_stock: i32,
        new_stock: i32,
        delta: i32,
        reason: String,
        actor_id: Option<Uuid>,
    },
    ShopInventoryAdjusted {
        shop_id: Uuid,
        product_id: Uuid,
        previous_stock: i32,
        new_stock: i32,
        delta: i32,
    },
    LowStockDetected {
        scope: LowStockScope,
        product_id: Uuid,
        shop_id: Option<Uuid>,
        current_stock: i32,
        threshold: i32,
        manager_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowStockScope {
    Factory,
    Shop,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

fn timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Processes committed domain events, delivering each to the configured
/// sinks. Delivery is best-effort: a failing sink is logged with the event
/// context and never affects the already-committed mutation.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, sinks: SinkSet) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        dispatch(&event, &sinks).await;
    }

    info!("Event channel closed; stopping event processing loop");
}

async fn dispatch(event: &Event, sinks: &SinkSet) {
    let (notification, audit, broadcast_name) = render(event);

    if let Some((target, n)) = notification {
        if let Err(e) = sinks.notifications.notify(target, n).await {
            error!(error = %e, event = ?event, "notification delivery failed");
        }
    }

    if let Err(e) = sinks.audit.record(audit).await {
        error!(error = %e, event = ?event, "audit record delivery failed");
    }

    let payload = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if let Err(e) = sinks.broadcast.broadcast(broadcast_name, payload).await {
        error!(error = %e, event = ?event, "broadcast delivery failed");
    }
}

/// Maps an event to its notification target/payload, audit record, and
/// broadcast channel name.
fn render(event: &Event) -> (Option<(NotificationTarget, Notification)>, AuditRecord, &'static str) {
    match event {
        Event::RestockRequestCreated {
            request_id,
            shop_id,
            product_id,
            requested_amount,
            actor_id,
            auto_generated,
            ..
        } => {
            let source = if *auto_generated {
                "automatically after a low-stock breach"
            } else {
                "by a user"
            };
            let message = format!(
                "Restock request for {} units of product {} created {}",
                requested_amount, product_id, source
            );
            (
                Some((
                    NotificationTarget::Role(Role::Admin),
                    Notification::new(
                        NotificationKind::RestockRequest,
                        message.clone(),
                        json!({
                            "request_id": request_id,
                            "shop_id": shop_id,
                            "product_id": product_id,
                            "requested_amount": requested_amount,
                        }),
                    ),
                )),
                AuditRecord {
                    action: "restock_request.create".to_string(),
                    entity: "restock_request".to_string(),
                    entity_id: *request_id,
                    actor_id: *actor_id,
                    shop_id: Some(*shop_id),
                    message,
                    metadata: json!({
                        "requested_amount": requested_amount,
                        "auto_generated": auto_generated,
                    }),
                    recorded_at: timestamp(),
                },
                "restock_request.created",
            )
        }
        Event::RestockRequestStatusChanged {
            request_id,
            shop_id,
            product_id,
            requested_amount,
            previous_status,
            new_status,
            actor_id,
            manager_id,
        } => {
            let message = format!(
                "Restock request {} moved from '{}' to '{}'",
                request_id, previous_status, new_status
            );
            let target = manager_id
                .map(NotificationTarget::User)
                .unwrap_or(NotificationTarget::Role(Role::Admin));
            (
                Some((
                    target,
                    Notification::new(
                        NotificationKind::RestockStatus,
                        message.clone(),
                        json!({
                            "request_id": request_id,
                            "shop_id": shop_id,
                            "product_id": product_id,
                            "status": new_status,
                        }),
                    ),
                )),
                AuditRecord {
                    action: "restock_request.status_change".to_string(),
                    entity: "restock_request".to_string(),
                    entity_id: *request_id,
                    actor_id: Some(*actor_id),
                    shop_id: Some(*shop_id),
                    message,
                    metadata: json!({
                        "previous_status": previous_status,
                        "new_status": new_status,
                        "requested_amount": requested_amount,
                    }),
                    recorded_at: timestamp(),
                },
                "restock_request.status_changed",
            )
        }
        Event::RestockRequestHidden {
            request_id,
            shop_id,
            actor_id,
        } => (
            None,
            AuditRecord {
                action: "restock_request.hide".to_string(),
                entity: "restock_request".to_string(),
                entity_id: *request_id,
                actor_id: Some(*actor_id),
                shop_id: Some(*shop_id),
                message: format!("Restock request {} hidden", request_id),
                metadata: json!({}),
                recorded_at: timestamp(),
            },
            "restock_request.hidden",
        ),
        Event::FactoryStockAdjusted {
            product_id,
            previous_stock,
            new_stock,
            delta,
            reason,
            actor_id,
        } => (
            None,
            AuditRecord {
                action: "stock.factory_adjust".to_string(),
                entity: "product".to_string(),
                entity_id: *product_id,
                actor_id: *actor_id,
                shop_id: None,
                message: format!(
                    "Factory stock for product {} changed {} -> {} ({})",
                    product_id, previous_stock, new_stock, reason
                ),
                metadata: json!({
                    "previous_stock": previous_stock,
                    "new_stock": new_stock,
                    "delta": delta,
                    "reason": reason,
                }),
                recorded_at: timestamp(),
            },
            "stock.factory_adjusted",
        ),
        Event::ShopInventoryAdjusted {
            shop_id,
            product_id,
            previous_stock,
            new_stock,
            delta,
        } => (
            None,
            AuditRecord {
                action: "stock.shop_adjust".to_string(),
                entity: "shop_inventory".to_string(),
                entity_id: *product_id,
                actor_id: None,
                shop_id: Some(*shop_id),
                message: format!(
                    "Shop {} inventory for product {} changed {} -> {}",
                    shop_id, product_id, previous_stock, new_stock
                ),
                metadata: json!({
                    "previous_stock": previous_stock,
                    "new_stock": new_stock,
                    "delta": delta,
                }),
                recorded_at: timestamp(),
            },
            "stock.shop_adjusted",
        ),
        Event::LowStockDetected {
            scope,
            product_id,
            shop_id,
            current_stock,
            threshold,
            manager_id,
        } => {
            let message = match scope {
                LowStockScope::Factory => format!(
                    "Factory stock for product {} is low: {} on hand (threshold {})",
                    product_id, current_stock, threshold
                ),
                LowStockScope::Shop => format!(
                    "Shop stock for product {} is low: {} on hand (threshold {})",
                    product_id, current_stock, threshold
                ),
            };
            let target = match (scope, manager_id) {
                (LowStockScope::Shop, Some(manager)) => NotificationTarget::User(*manager),
                _ => NotificationTarget::Role(Role::Admin),
            };
            (
                Some((
                    target,
                    Notification::new(
                        NotificationKind::LowStock,
                        message.clone(),
                        json!({
                            "scope": scope,
                            "product_id": product_id,
                            "shop_id": shop_id,
                            "current_stock": current_stock,
                            "threshold": threshold,
                        }),
                    ),
                )),
                AuditRecord {
                    action: "stock.low_stock_alert".to_string(),
                    entity: "product".to_string(),
                    entity_id: *product_id,
                    actor_id: None,
                    shop_id: *shop_id,
                    message,
                    metadata: json!({
                        "current_stock": current_stock,
                        "threshold": threshold,
                    }),
                    recorded_at: timestamp(),
                },
                "stock.low_stock",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::memory::{InMemoryAuditSink, InMemoryNotificationSink};
    use crate::notifications::ChannelBroadcastSink;
    use std::sync::Arc;

    fn test_sinks() -> (SinkSet, Arc<InMemoryNotificationSink>, Arc<InMemoryAuditSink>) {
        let notifications = Arc::new(InMemoryNotificationSink::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let sinks = SinkSet {
            notifications: notifications.clone(),
            audit: audit.clone(),
            broadcast: Arc::new(ChannelBroadcastSink::new(8)),
        };
        (sinks, notifications, audit)
    }

    #[tokio::test]
    async fn created_event_notifies_admins_and_audits() {
        let (sinks, notifications, audit) = test_sinks();
        let event = Event::RestockRequestCreated {
            request_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            requested_amount: 40,
            actor_id: Some(Uuid::new_v4()),
            manager_id: None,
            auto_generated: false,
        };

        dispatch(&event, &sinks).await;

        let sent = notifications.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NotificationTarget::Role(Role::Admin));

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "restock_request.create");
    }

    #[tokio::test]
    async fn status_change_targets_shop_manager_when_known() {
        let (sinks, notifications, _) = test_sinks();
        let manager = Uuid::new_v4();
        let event = Event::RestockRequestStatusChanged {
            request_id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            requested_amount: 10,
            previous_status: "waiting_for_approval".into(),
            new_status: "approved_pending".into(),
            actor_id: Uuid::new_v4(),
            manager_id: Some(manager),
        };

        dispatch(&event, &sinks).await;

        let sent = notifications.sent.lock().unwrap();
        assert_eq!(sent[0].0, NotificationTarget::User(manager));
    }

    #[tokio::test]
    async fn shop_low_stock_without_manager_falls_back_to_admins() {
        let (sinks, notifications, _) = test_sinks();
        let event = Event::LowStockDetected {
            scope: LowStockScope::Shop,
            product_id: Uuid::new_v4(),
            shop_id: Some(Uuid::new_v4()),
            current_stock: 3,
            threshold: 10,
            manager_id: None,
        };

        dispatch(&event, &sinks).await;

        let sent = notifications.sent.lock().unwrap();
        assert_eq!(sent[0].0, NotificationTarget::Role(Role::Admin));
    }
}
