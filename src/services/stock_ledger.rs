use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{product, shop_inventory},
    errors::ServiceError,
    events::{Event, EventSender},
    services::low_stock::LowStockMonitor,
};

/// Outcome of one factory-stock mutation.
#[derive(Debug, Clone)]
pub struct FactoryAdjustment {
    pub previous_stock: i32,
    pub new_stock: i32,
    pub delta: i32,
    pub product: product::Model,
}

/// Outcome of one shop-inventory mutation.
#[derive(Debug, Clone)]
pub struct ShopAdjustment {
    pub previous_stock: i32,
    pub new_stock: i32,
    pub delta: i32,
    pub inventory: shop_inventory::Model,
}

/// The only sanctioned path to the two stock counters.
///
/// Every write goes through a guarded conditional UPDATE that carries its own
/// floor-at-zero predicate, so the sufficiency check and the decrement are one
/// statement at the store. Two transactions racing on the same product cannot
/// both pass a stale check; the loser's guard matches zero rows and surfaces
/// as `InsufficientStock`.
#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DbPool>,
    event_sender: EventSender,
    low_stock: LowStockMonitor,
}

impl StockLedger {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, low_stock: LowStockMonitor) -> Self {
        Self {
            db,
            event_sender,
            low_stock,
        }
    }

    /// Applies `delta` to a product's factory stock inside the caller's
    /// connection or transaction.
    pub async fn apply_factory_delta<C>(
        conn: &C,
        product_id: Uuid,
        delta: i32,
    ) -> Result<FactoryAdjustment, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut update = product::Entity::update_many()
            .col_expr(
                product::Column::TotalStock,
                Expr::col(product::Column::TotalStock).add(delta),
            )
            .col_expr(
                product::Column::Version,
                Expr::col(product::Column::Version).add(1),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id));

        if delta < 0 {
            update = update.filter(product::Column::TotalStock.gte(-delta));
        }

        let result = update.exec(conn).await.map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            // Either the product is gone or the guard lost to the floor.
            let current = product::Entity::find_by_id(product_id)
                .one(conn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            return Err(ServiceError::InsufficientStock {
                product_id,
                available: current.total_stock,
                requested: -delta,
            });
        }

        let updated = product::Entity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(FactoryAdjustment {
            previous_stock: updated.total_stock - delta,
            new_stock: updated.total_stock,
            delta,
            product: updated,
        })
    }

    /// Applies `delta` to a shop's inventory row inside the caller's
    /// connection or transaction, creating the row lazily on first contact.
    pub async fn apply_shop_delta<C>(
        conn: &C,
        shop_id: Uuid,
        product_id: Uuid,
        delta: i32,
    ) -> Result<ShopAdjustment, ServiceError>
    where
        C: ConnectionTrait,
    {
        let existing = shop_inventory::Entity::find()
            .filter(shop_inventory::Column::ShopId.eq(shop_id))
            .filter(shop_inventory::Column::ProductId.eq(product_id))
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let Some(row) = existing else {
            let initial = delta.max(0);
            let model = shop_inventory::ActiveModel {
                id: Set(Uuid::new_v4()),
                shop_id: Set(shop_id),
                product_id: Set(product_id),
                current_stock: Set(initial),
                min_stock_per_item: Set(None),
                last_restock_date: Set((delta > 0).then(Utc::now)),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

            return Ok(ShopAdjustment {
                previous_stock: 0,
                new_stock: initial,
                delta,
                inventory: model,
            });
        };

        let mut update = shop_inventory::Entity::update_many()
            .col_expr(
                shop_inventory::Column::CurrentStock,
                Expr::col(shop_inventory::Column::CurrentStock).add(delta),
            )
            .col_expr(shop_inventory::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(shop_inventory::Column::Id.eq(row.id));

        if delta > 0 {
            // Stock arriving reactivates a soft-deleted row.
            update = update
                .col_expr(
                    shop_inventory::Column::LastRestockDate,
                    Expr::value(Utc::now()),
                )
                .col_expr(shop_inventory::Column::IsActive, Expr::value(true));
        }
        if delta < 0 {
            update = update.filter(shop_inventory::Column::CurrentStock.gte(-delta));
        }

        let result = update.exec(conn).await.map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            let current = shop_inventory::Entity::find_by_id(row.id)
                .one(conn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .map(|inv| inv.current_stock)
                .unwrap_or(0);
            return Err(ServiceError::InsufficientStock {
                product_id,
                available: current,
                requested: -delta,
            });
        }

        let updated = shop_inventory::Entity::find_by_id(row.id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Inventory for shop {} and product {} not found",
                    shop_id, product_id
                ))
            })?;

        Ok(ShopAdjustment {
            previous_stock: updated.current_stock - delta,
            new_stock: updated.current_stock,
            delta,
            inventory: updated,
        })
    }

    /// Adjusts factory stock as a standalone operation (admin stock edits).
    ///
    /// Fulfillment does not come through here; the workflow engine runs the
    /// same leg inside its own transaction together with the shop increment.
    #[instrument(skip(self), fields(product_id = %product_id, delta = delta))]
    pub async fn adjust_factory_stock(
        &self,
        actor_id: Option<Uuid>,
        product_id: Uuid,
        delta: i32,
        reason: &str,
    ) -> Result<product::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;
        let adjustment = Self::apply_factory_delta(&txn, product_id, delta).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        self.publish_factory_adjustment(&adjustment, reason, actor_id)
            .await;

        Ok(adjustment.product)
    }

    /// Adjusts a shop's inventory as a standalone operation.
    #[instrument(skip(self), fields(shop_id = %shop_id, product_id = %product_id, delta = delta))]
    pub async fn adjust_shop_inventory(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
        delta: i32,
    ) -> Result<shop_inventory::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;
        let adjustment = Self::apply_shop_delta(&txn, shop_id, product_id, delta).await?;
        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        self.publish_shop_adjustment(shop_id, &adjustment).await;

        Ok(adjustment.inventory)
    }

    /// Post-commit side effects for a factory mutation: the stock-update
    /// broadcast plus a low-stock sweep. Failures are logged, never returned.
    pub async fn publish_factory_adjustment(
        &self,
        adjustment: &FactoryAdjustment,
        reason: &str,
        actor_id: Option<Uuid>,
    ) {
        if let Err(e) = self
            .event_sender
            .send(Event::FactoryStockAdjusted {
                product_id: adjustment.product.id,
                previous_stock: adjustment.previous_stock,
                new_stock: adjustment.new_stock,
                delta: adjustment.delta,
                reason: reason.to_string(),
                actor_id,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue factory stock event");
        }

        if let Err(e) = self.low_stock.evaluate_factory(&adjustment.product).await {
            warn!(error = %e, product_id = %adjustment.product.id, "factory low-stock evaluation failed");
        }
    }

    /// Post-commit side effects for a shop mutation.
    pub async fn publish_shop_adjustment(&self, shop_id: Uuid, adjustment: &ShopAdjustment) {
        if let Err(e) = self
            .event_sender
            .send(Event::ShopInventoryAdjusted {
                shop_id,
                product_id: adjustment.inventory.product_id,
                previous_stock: adjustment.previous_stock,
                new_stock: adjustment.new_stock,
                delta: adjustment.delta,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue shop inventory event");
        }

        if let Err(e) = self
            .low_stock
            .evaluate_shop(shop_id, adjustment.inventory.product_id)
            .await
        {
            warn!(error = %e, shop_id = %shop_id, "shop low-stock evaluation failed");
        }
    }
}
