mod common;

use assert_matches::assert_matches;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use common::{admin, seed_product, seed_shop, setup, shop_owner};
use restock_api::{
    entities::{product, restock_request, shop_inventory, RequestType, RestockStatus},
    errors::ServiceError,
    services::products::StockAdjustment,
    services::restock_requests::{CreateRestockRequest, ListRestockRequests},
    services::stock_ledger::StockLedger,
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

async fn shop_stock(app: &common::TestApp, shop_id: Uuid, product_id: Uuid) -> Option<i32> {
    shop_inventory::Entity::find()
        .filter(shop_inventory::Column::ShopId.eq(shop_id))
        .filter(shop_inventory::Column::ProductId.eq(product_id))
        .one(app.db.as_ref())
        .await
        .unwrap()
        .map(|inv| inv.current_stock)
}

async fn factory_stock(app: &common::TestApp, product_id: Uuid) -> i32 {
    product::Entity::find_by_id(product_id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .total_stock
}

#[tokio::test]
async fn full_lifecycle_reconciles_both_counters() {
    let app = setup().await;
    let owner_id = Uuid::new_v4();
    let product = seed_product(&app, "SKU-100", 100, Some(20)).await;
    let shop = seed_shop(&app, "Main Street", Some(owner_id)).await;

    let owner = shop_owner(owner_id);
    let request = app
        .services
        .restock_requests
        .create(&owner, create_cmd(shop.id, product.id, 50))
        .await
        .unwrap();
    assert_eq!(request.status, RestockStatus::WaitingForApproval);
    assert!(request.approved_at.is_none());

    // Approval only checks availability; the factory pool is untouched.
    let approved = app
        .services
        .restock_requests
        .approve(&admin(), request.id)
        .await
        .unwrap();
    assert_eq!(approved.status, RestockStatus::ApprovedPending);
    assert!(approved.approved_at.is_some());
    assert_eq!(factory_stock(&app, product.id).await, 100);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, None);

    let fulfilled = app
        .services
        .restock_requests
        .fulfill(&admin(), request.id)
        .await
        .unwrap();
    assert_eq!(fulfilled.status, RestockStatus::Fulfilled);
    assert!(fulfilled.fulfilled_at.is_some());
    assert_eq!(factory_stock(&app, product.id).await, 50);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, Some(50));

    let inventory = shop_inventory::Entity::find()
        .filter(shop_inventory::Column::ShopId.eq(shop.id))
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(inventory.last_restock_date.is_some());
}

#[tokio::test]
async fn fulfill_fails_when_stock_moved_after_approval() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-150", 200, None).await;
    let shop = seed_shop(&app, "Harbor", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 150))
        .await
        .unwrap();
    app.services
        .restock_requests
        .approve(&admin(), request.id)
        .await
        .unwrap();

    // Stock is consumed elsewhere between approval and fulfillment.
    app.services
        .products
        .set_stock(
            &admin(),
            product.id,
            StockAdjustment {
                delta: None,
                absolute: Some(100),
                reason: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .fulfill(&admin(), request.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            available: 100,
            requested: 150,
            ..
        }
    );

    // The failed transition leaves everything as it was.
    let reloaded = restock_request::Entity::find_by_id(request.id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, RestockStatus::ApprovedPending);
    assert!(reloaded.fulfilled_at.is_none());
    assert_eq!(factory_stock(&app, product.id).await, 100);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, None);
}

#[tokio::test]
async fn fulfilling_twice_is_rejected_without_stock_effect() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-DUP", 100, None).await;
    let shop = seed_shop(&app, "Corner", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 30))
        .await
        .unwrap();
    app.services
        .restock_requests
        .approve(&admin(), request.id)
        .await
        .unwrap();
    app.services
        .restock_requests
        .fulfill(&admin(), request.id)
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .fulfill(&admin(), request.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    assert_eq!(factory_stock(&app, product.id).await, 70);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, Some(30));
}

#[tokio::test]
async fn terminal_states_admit_no_transition() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-TERM", 100, None).await;
    let shop = seed_shop(&app, "Terminal", None).await;

    let rejected = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();
    app.services
        .restock_requests
        .reject(&admin(), rejected.id, Some("not needed".into()))
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .approve(&admin(), rejected.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });

    let err = app
        .services
        .restock_requests
        .update_status(&admin(), rejected.id, RestockStatus::Fulfilled, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });
}

#[tokio::test]
async fn rejection_keeps_stock_and_records_notes() {
    let app = setup().await;
    let owner_id = Uuid::new_v4();
    let product = seed_product(&app, "SKU-REJ", 80, None).await;
    let shop = seed_shop(&app, "Rejected Goods", Some(owner_id)).await;

    let request = app
        .services
        .restock_requests
        .create(&shop_owner(owner_id), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();

    let rejected = app
        .services
        .restock_requests
        .reject(&shop_owner(owner_id), request.id, Some("duplicate order".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, RestockStatus::Rejected);
    assert_eq!(rejected.notes.as_deref(), Some("duplicate order"));
    assert_eq!(factory_stock(&app, product.id).await, 80);
}

#[tokio::test]
async fn second_waiting_request_for_same_pair_conflicts() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-CONF", 100, None).await;
    let shop = seed_shop(&app, "Single File", None).await;

    app.services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 20))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn admin_override_to_fulfilled_moves_stock() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-OVR", 100, None).await;
    let shop = seed_shop(&app, "Override", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 25))
        .await
        .unwrap();
    app.services
        .restock_requests
        .update_status(&admin(), request.id, RestockStatus::ApprovedPending, None)
        .await
        .unwrap();
    let fulfilled = app
        .services
        .restock_requests
        .update_status(&admin(), request.id, RestockStatus::Fulfilled, None)
        .await
        .unwrap();

    assert_eq!(fulfilled.status, RestockStatus::Fulfilled);
    assert_eq!(factory_stock(&app, product.id).await, 75);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, Some(25));
}

#[tokio::test]
async fn override_cannot_skip_approval() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-SKIP", 100, None).await;
    let shop = seed_shop(&app, "No Shortcut", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 25))
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .update_status(&admin(), request.id, RestockStatus::Fulfilled, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStateTransition { .. });
    assert_eq!(factory_stock(&app, product.id).await, 100);
}

#[tokio::test]
async fn hidden_requests_drop_out_of_default_listing() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-HID", 100, None).await;
    let shop = seed_shop(&app, "Hideaway", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();

    let hidden = app
        .services
        .restock_requests
        .hide(&admin(), request.id)
        .await
        .unwrap();
    assert!(hidden.hidden);
    // Status is untouched by the soft delete.
    assert_eq!(hidden.status, RestockStatus::WaitingForApproval);

    let (visible, total) = app
        .services
        .restock_requests
        .list(
            &admin(),
            ListRestockRequests {
                shop_id: None,
                include_hidden: false,
                page: 1,
                limit: 20,
            },
        )
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(visible.is_empty());

    let (all, total) = app
        .services
        .restock_requests
        .list(
            &admin(),
            ListRestockRequests {
                shop_id: None,
                include_hidden: true,
                page: 1,
                limit: 20,
            },
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(all[0].id, request.id);
}

#[tokio::test]
async fn shop_owner_cannot_touch_foreign_shop() {
    let app = setup().await;
    let owner_id = Uuid::new_v4();
    let intruder_id = Uuid::new_v4();
    let product = seed_product(&app, "SKU-FOR", 100, None).await;
    let shop = seed_shop(&app, "Walled Garden", Some(owner_id)).await;

    let err = app
        .services
        .restock_requests
        .create(&shop_owner(intruder_id), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let request = app
        .services
        .restock_requests
        .create(&shop_owner(owner_id), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();

    let err = app
        .services
        .restock_requests
        .approve(&shop_owner(intruder_id), request.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // Fulfillment moves factory stock and stays with Admins.
    app.services
        .restock_requests
        .approve(&shop_owner(owner_id), request.id)
        .await
        .unwrap();
    let err = app
        .services
        .restock_requests
        .fulfill(&shop_owner(owner_id), request.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn create_rejects_non_positive_amount_and_inactive_entities() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-VAL", 100, None).await;
    let shop = seed_shop(&app, "Validations", None).await;

    let err = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.services
        .shops
        .deactivate(&admin(), shop.id)
        .await
        .unwrap();
    let err = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn fulfill_by_pair_resolves_the_approved_request() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-PAIR", 100, None).await;
    let shop = seed_shop(&app, "Paired", None).await;

    let request = app
        .services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 40))
        .await
        .unwrap();
    app.services
        .restock_requests
        .approve(&admin(), request.id)
        .await
        .unwrap();

    let fulfilled = app
        .services
        .restock_requests
        .fulfill_by_pair(&admin(), shop.id, product.id)
        .await
        .unwrap();
    assert_eq!(fulfilled.id, request.id);
    assert_eq!(factory_stock(&app, product.id).await, 60);

    let err = app
        .services
        .restock_requests
        .fulfill_by_pair(&admin(), shop.id, product.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn aborted_transaction_persists_neither_leg() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-ATOM", 100, None).await;
    let shop = seed_shop(&app, "Atomic", None).await;

    // Materialize an empty inventory row so the failing leg has a target.
    app.services
        .stock_ledger
        .adjust_shop_inventory(shop.id, product.id, 0)
        .await
        .unwrap();

    let txn = app.db.begin().await.unwrap();
    StockLedger::apply_factory_delta(&txn, product.id, -30)
        .await
        .unwrap();
    let err = StockLedger::apply_shop_delta(&txn, shop.id, product.id, -5)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });
    drop(txn); // rollback

    assert_eq!(factory_stock(&app, product.id).await, 100);
    assert_eq!(shop_stock(&app, shop.id, product.id).await, Some(0));
}

#[tokio::test]
async fn absolute_stock_edit_translates_to_guarded_delta() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-ABS", 100, None).await;

    let updated = app
        .services
        .products
        .set_stock(
            &admin(),
            product.id,
            StockAdjustment {
                delta: None,
                absolute: Some(30),
                reason: Some("cycle count".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.total_stock, 30);

    let err = app
        .services
        .products
        .set_stock(
            &admin(),
            product.id,
            StockAdjustment {
                delta: Some(-40),
                absolute: None,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            available: 30,
            requested: 40,
            ..
        }
    );
    assert_eq!(factory_stock(&app, product.id).await, 30);

    let err = app
        .services
        .products
        .set_stock(
            &admin(),
            product.id,
            StockAdjustment {
                delta: Some(1),
                absolute: Some(2),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn product_delete_blocked_while_requests_reference_it() {
    let app = setup().await;
    let product = seed_product(&app, "SKU-DEL", 100, None).await;
    let shop = seed_shop(&app, "Deletion", None).await;

    app.services
        .restock_requests
        .create(&admin(), create_cmd(shop.id, product.id, 10))
        .await
        .unwrap();

    let err = app
        .services
        .products
        .delete(&admin(), product.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    // A product with no request history can go.
    let fresh = seed_product(&app, "SKU-FRESH", 5, None).await;
    app.services.products.delete(&admin(), fresh.id).await.unwrap();
}
