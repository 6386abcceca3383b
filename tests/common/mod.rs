//! Shared test bootstrap: in-memory SQLite with the embedded migrations and
//! capturing sinks, mirroring the production wiring in `main.rs`.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use restock_api::{
    auth::{AuthContext, Role},
    db::{self, DbConfig, DbPool},
    events::{self, EventSender},
    notifications::memory::{InMemoryAuditSink, InMemoryNotificationSink},
    notifications::{ChannelBroadcastSink, SinkSet},
    services::AppServices,
};

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub notifications: Arc<InMemoryNotificationSink>,
    pub audit: Arc<InMemoryAuditSink>,
}

/// A single-connection pool keeps every handle on the same in-memory
/// database for the lifetime of the test.
pub async fn setup() -> TestApp {
    let cfg = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&cfg)
        .await
        .expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");

    let db_arc = Arc::new(pool);
    let (tx, rx) = mpsc::channel(256);
    let event_sender = EventSender::new(tx);

    let notifications = Arc::new(InMemoryNotificationSink::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let sinks = SinkSet {
        notifications: notifications.clone(),
        audit: audit.clone(),
        broadcast: Arc::new(ChannelBroadcastSink::new(64)),
    };
    tokio::spawn(events::process_events(rx, sinks));

    let services = AppServices::new(db_arc.clone(), event_sender);

    TestApp {
        db: db_arc,
        services,
        notifications,
        audit,
    }
}

pub fn admin() -> AuthContext {
    AuthContext::new(Uuid::new_v4(), Role::Admin)
}

pub fn shop_owner(user_id: Uuid) -> AuthContext {
    AuthContext::new(user_id, Role::ShopOwner)
}

pub async fn seed_product(
    app: &TestApp,
    sku: &str,
    total_stock: i32,
    min_stock_level: Option<i32>,
) -> restock_api::entities::product::Model {
    restock_api::entities::product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(sku.to_string()),
        name: Set(format!("{} test product", sku)),
        description: Set(None),
        unit_price: Set(rust_decimal_macros::dec!(9.99)),
        total_stock: Set(total_stock),
        min_stock_level: Set(min_stock_level),
        ..Default::default()
    }
    .insert(app.db.as_ref())
    .await
    .expect("seed product")
}

pub async fn seed_shop(
    app: &TestApp,
    name: &str,
    manager_id: Option<Uuid>,
) -> restock_api::entities::shop::Model {
    let shop = restock_api::entities::shop::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        manager_id: Set(manager_id),
        ..Default::default()
    }
    .insert(app.db.as_ref())
    .await
    .expect("seed shop");

    if let Some(user_id) = manager_id {
        restock_api::entities::shop_assignment::ActiveModel {
            shop_id: Set(shop.id),
            user_id: Set(user_id),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(app.db.as_ref())
        .await
        .expect("seed shop assignment");
    }

    shop
}

/// Polls until `predicate` holds; the event loop delivers asynchronously.
pub async fn wait_until<F>(predicate: F, what: &str)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
