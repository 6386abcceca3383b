//! The sufficiency check and the decrement are one guarded UPDATE, so any
//! interleaving of two fulfillments against the same product lets exactly one
//! win. SQLite serializes the writes here; against Postgres the same guard
//! rides on row locks, which is what production relies on.

mod common;

use assert_matches::assert_matches;
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::{admin, seed_product, seed_shop, setup};
use restock_api::{
    entities::{product, restock_request, RequestType, RestockStatus},
    errors::ServiceError,
    services::restock_requests::CreateRestockRequest,
};

fn create_cmd(shop_id: Uuid, product_id: Uuid, amount: i32) -> CreateRestockRequest {
    CreateRestockRequest {
        shop_id,
        product_id,
        requested_amount: amount,
        request_type: RequestType::Restock,
        notes: None,
    }
}

#[tokio::test]
async fn concurrent_fulfillments_cannot_overdraw() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-RACE", 100, None).await;
    let shop_a = seed_shop(&app, "Racer A", None).await;
    let shop_b = seed_shop(&app, "Racer B", None).await;

    let mut request_ids = Vec::new();
    for shop_id in [shop_a.id, shop_b.id] {
        let request = app
            .services
            .restock_requests
            .create(&admin(), create_cmd(shop_id, product.id, 60))
            .await
            .unwrap();
        // Both approvals pass: 100 >= 60 at approval time for each.
        app.services
            .restock_requests
            .approve(&admin(), request.id)
            .await
            .unwrap();
        request_ids.push(request.id);
    }

    let mut handles = Vec::new();
    for request_id in request_ids.clone() {
        let service = app.services.restock_requests.clone();
        handles.push(tokio::spawn(async move {
            service.fulfill(&admin(), request_id).await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_matches!(err, ServiceError::InsufficientStock { .. });
                insufficient += 1;
            }
        }
    }
    assert_eq!(successes, 1, "exactly one fulfillment may win");
    assert_eq!(insufficient, 1);

    let remaining = product::Entity::find_by_id(product.id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .total_stock;
    assert_eq!(remaining, 40);

    // The loser is left approved, eligible for retry once stock returns.
    let mut statuses: Vec<RestockStatus> = Vec::new();
    for request_id in request_ids {
        statuses.push(
            restock_request::Entity::find_by_id(request_id)
                .one(app.db.as_ref())
                .await
                .unwrap()
                .unwrap()
                .status,
        );
    }
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(
        statuses,
        vec![RestockStatus::ApprovedPending, RestockStatus::Fulfilled]
    );
}

#[tokio::test]
async fn overdraw_sweep_stops_exactly_at_zero() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-SWEEP", 10, None).await;

    let mut request_ids = Vec::new();
    for i in 0..20 {
        let shop = seed_shop(&app, &format!("Sweep {}", i), None).await;
        let request = app
            .services
            .restock_requests
            .create(&admin(), create_cmd(shop.id, product.id, 1))
            .await
            .unwrap();
        app.services
            .restock_requests
            .approve(&admin(), request.id)
            .await
            .unwrap();
        request_ids.push(request.id);
    }

    let mut handles = Vec::new();
    for request_id in request_ids {
        let service = app.services.restock_requests.clone();
        handles.push(tokio::spawn(async move {
            service.fulfill(&admin(), request_id).await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(
        successes, 10,
        "exactly 10 single-unit fulfillments should succeed"
    );

    let remaining = product::Entity::find_by_id(product.id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .total_stock;
    assert_eq!(remaining, 0);
}
