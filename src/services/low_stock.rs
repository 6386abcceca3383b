use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{product, restock_request, shop, shop_inventory, RequestType, RestockStatus},
    errors::ServiceError,
    events::{Event, EventSender, LowStockScope},
};

/// Watches the two counters after every mutation and raises alerts when a
/// threshold is crossed. For shop inventory it additionally opens a
/// replenishment request, suppressed while an earlier one is still unresolved.
#[derive(Clone)]
pub struct LowStockMonitor {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl LowStockMonitor {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Factory-side check: alert Admins when `total_stock` sinks to or below
    /// the product's own threshold. No request is generated; replenishing the
    /// factory is a procurement concern outside this system.
    pub async fn evaluate_factory(&self, product: &product::Model) -> Result<(), ServiceError> {
        let Some(threshold) = product.min_stock_level else {
            return Ok(());
        };
        if product.total_stock > threshold {
            return Ok(());
        }

        if let Err(e) = self
            .event_sender
            .send(Event::LowStockDetected {
                scope: LowStockScope::Factory,
                product_id: product.id,
                shop_id: None,
                current_stock: product.total_stock,
                threshold,
                manager_id: None,
            })
            .await
        {
            warn!(error = %e, product_id = %product.id, "failed to enqueue factory low-stock alert");
        }

        Ok(())
    }

    /// Shop-side check for one `(shop, product)` pair. Returns the
    /// auto-generated request when one was opened.
    #[instrument(skip(self), fields(shop_id = %shop_id, product_id = %product_id))]
    pub async fn evaluate_shop(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<restock_request::Model>, ServiceError> {
        let db = self.db.as_ref();

        let Some(inventory) = shop_inventory::Entity::find()
            .filter(shop_inventory::Column::ShopId.eq(shop_id))
            .filter(shop_inventory::Column::ProductId.eq(product_id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        else {
            return Ok(None);
        };

        if !inventory.is_active || !inventory.low_stock_alerts_enabled {
            return Ok(None);
        }

        let product = product::Entity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let Some(threshold) = inventory.effective_threshold(product.min_stock_level) else {
            return Ok(None);
        };
        if threshold <= 0 || inventory.current_stock > threshold {
            return Ok(None);
        }

        let shop = shop::Entity::find_by_id(shop_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Shop {} not found", shop_id)))?;

        if let Err(e) = self
            .event_sender
            .send(Event::LowStockDetected {
                scope: LowStockScope::Shop,
                product_id,
                shop_id: Some(shop_id),
                current_stock: inventory.current_stock,
                threshold,
                manager_id: shop.manager_id,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue shop low-stock alert");
        }

        self.auto_generate_request(&shop, &product, threshold).await
    }

    /// Opens a `waiting_for_approval` request for twice the threshold, unless
    /// an unresolved request for the pair already exists.
    async fn auto_generate_request(
        &self,
        shop: &shop::Model,
        product: &product::Model,
        threshold: i32,
    ) -> Result<Option<restock_request::Model>, ServiceError> {
        let db = self.db.as_ref();

        let unresolved = restock_request::Entity::find()
            .filter(restock_request::Column::ShopId.eq(shop.id))
            .filter(restock_request::Column::ProductId.eq(product.id))
            .filter(restock_request::Column::Status.is_in([
                RestockStatus::WaitingForApproval,
                RestockStatus::ApprovedPending,
            ]))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if unresolved.is_some() {
            return Ok(None);
        }

        let requested_amount = threshold * 2;
        if requested_amount <= 0 {
            return Ok(None);
        }

        let request = restock_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(shop.id),
            product_id: Set(product.id),
            requested_amount: Set(requested_amount),
            request_type: Set(RequestType::Restock),
            status: Set(RestockStatus::WaitingForApproval),
            notes: Set(Some(format!(
                "Auto-generated: stock fell to or below the threshold of {}",
                threshold
            ))),
            approved_at: Set(None),
            fulfilled_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(
            request_id = %request.id,
            shop_id = %shop.id,
            product_id = %product.id,
            requested_amount,
            "auto-generated restock request"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::RestockRequestCreated {
                request_id: request.id,
                shop_id: shop.id,
                product_id: product.id,
                requested_amount,
                actor_id: None,
                manager_id: shop.manager_id,
                auto_generated: true,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue auto-generated request event");
        }

        Ok(Some(request))
    }
}
