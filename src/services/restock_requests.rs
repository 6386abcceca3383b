use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{ensure_can_manage_shop, AuthContext},
    db::DbPool,
    entities::{product, restock_request, shop, RequestType, RestockStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::low_stock::LowStockMonitor,
    services::stock_ledger::StockLedger,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRestockRequest {
    pub shop_id: Uuid,
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Requested amount must be positive"))]
    pub requested_amount: i32,
    pub request_type: RequestType,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRestockRequests {
    /// Restrict to one shop; `None` means the factory-wide view (Admin only)
    pub shop_id: Option<Uuid>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

/// Orchestrates the request lifecycle: each public method is one transition of
/// the state machine plus its authorization, stock effects, and side effects.
///
/// Approval deliberately performs an availability check only; stock moves at
/// fulfillment so the factory counter reflects what has actually left the
/// building. Both steps check current stock because other requests may have
/// consumed it in between.
#[derive(Clone)]
pub struct RestockRequestService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    low_stock: LowStockMonitor,
}

impl RestockRequestService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, low_stock: LowStockMonitor) -> Self {
        Self {
            db,
            event_sender,
            low_stock,
        }
    }

    /// Creates a request in `waiting_for_approval`.
    #[instrument(skip(self, ctx, cmd), fields(shop_id = %cmd.shop_id, product_id = %cmd.product_id))]
    pub async fn create(
        &self,
        ctx: &AuthContext,
        cmd: CreateRestockRequest,
    ) -> Result<restock_request::Model, ServiceError> {
        cmd.validate()?;

        let db = self.db.as_ref();

        let product = find_product(db, cmd.product_id).await?;
        if !product.is_active {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is not active",
                product.id
            )));
        }

        let shop = find_shop(db, cmd.shop_id).await?;
        if !shop.is_active {
            return Err(ServiceError::ValidationError(format!(
                "Shop {} is not active",
                shop.id
            )));
        }

        ensure_can_manage_shop(db, ctx, &shop).await?;

        let waiting = restock_request::Entity::find()
            .filter(restock_request::Column::ShopId.eq(cmd.shop_id))
            .filter(restock_request::Column::ProductId.eq(cmd.product_id))
            .filter(restock_request::Column::Status.eq(RestockStatus::WaitingForApproval))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if let Some(existing) = waiting {
            return Err(ServiceError::Conflict(format!(
                "Request {} for this shop and product is already waiting for approval",
                existing.id
            )));
        }

        let request = restock_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(cmd.shop_id),
            product_id: Set(cmd.product_id),
            requested_amount: Set(cmd.requested_amount),
            request_type: Set(cmd.request_type),
            status: Set(RestockStatus::WaitingForApproval),
            notes: Set(cmd.notes),
            approved_at: Set(None),
            fulfilled_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(request_id = %request.id, amount = request.requested_amount, "restock request created");

        if let Err(e) = self
            .event_sender
            .send(Event::RestockRequestCreated {
                request_id: request.id,
                shop_id: request.shop_id,
                product_id: request.product_id,
                requested_amount: request.requested_amount,
                actor_id: Some(ctx.user_id),
                manager_id: shop.manager_id,
                auto_generated: false,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue request-created event");
        }

        Ok(request)
    }

    /// `waiting_for_approval -> approved_pending`. Availability check only;
    /// no stock moves until fulfillment.
    #[instrument(skip(self, ctx), fields(request_id = %request_id))]
    pub async fn approve(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<restock_request::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let request = find_request(&txn, request_id).await?;
        let shop = find_shop(&txn, request.shop_id).await?;
        ensure_can_manage_shop(&txn, ctx, &shop).await?;

        ensure_transition(request.status, RestockStatus::ApprovedPending)?;

        let product = find_product(&txn, request.product_id).await?;
        if product.total_stock < request.requested_amount {
            return Err(ServiceError::InsufficientStock {
                product_id: product.id,
                available: product.total_stock,
                requested: request.requested_amount,
            });
        }

        let now = Utc::now();
        let claimed = restock_request::Entity::update_many()
            .col_expr(
                restock_request::Column::Status,
                Expr::value(RestockStatus::ApprovedPending.as_str()),
            )
            .col_expr(restock_request::Column::ApprovedAt, Expr::value(now))
            .col_expr(restock_request::Column::UpdatedAt, Expr::value(now))
            .filter(restock_request::Column::Id.eq(request_id))
            .filter(restock_request::Column::Status.eq(RestockStatus::WaitingForApproval))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            // Someone else resolved the request while we were checking.
            return Err(ServiceError::InvalidStateTransition {
                from: request.status.as_str().to_string(),
                to: RestockStatus::ApprovedPending.as_str().to_string(),
            });
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        let updated = find_request(self.db.as_ref(), request_id).await?;
        self.publish_status_change(ctx, &updated, request.status, shop.manager_id)
            .await;

        Ok(updated)
    }

    /// `waiting_for_approval -> rejected`. Terminal; no stock effect.
    #[instrument(skip(self, ctx), fields(request_id = %request_id))]
    pub async fn reject(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
        notes: Option<String>,
    ) -> Result<restock_request::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let request = find_request(&txn, request_id).await?;
        let shop = find_shop(&txn, request.shop_id).await?;
        ensure_can_manage_shop(&txn, ctx, &shop).await?;

        ensure_transition(request.status, RestockStatus::Rejected)?;

        let now = Utc::now();
        let mut update = restock_request::Entity::update_many()
            .col_expr(
                restock_request::Column::Status,
                Expr::value(RestockStatus::Rejected.as_str()),
            )
            .col_expr(restock_request::Column::UpdatedAt, Expr::value(now))
            .filter(restock_request::Column::Id.eq(request_id))
            .filter(restock_request::Column::Status.eq(RestockStatus::WaitingForApproval));
        if let Some(notes) = notes {
            update = update.col_expr(restock_request::Column::Notes, Expr::value(notes));
        }

        let claimed = update.exec(&txn).await.map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidStateTransition {
                from: request.status.as_str().to_string(),
                to: RestockStatus::Rejected.as_str().to_string(),
            });
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        let updated = find_request(self.db.as_ref(), request_id).await?;
        self.publish_status_change(ctx, &updated, request.status, shop.manager_id)
            .await;

        Ok(updated)
    }

    /// `approved_pending -> fulfilled`: the stock-affecting transition.
    ///
    /// Claiming the request row, decrementing the factory pool, and
    /// incrementing the shop inventory commit as one transaction; if any leg
    /// fails nothing is persisted and the request stays `approved_pending`.
    #[instrument(skip(self, ctx), fields(request_id = %request_id))]
    pub async fn fulfill(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<restock_request::Model, ServiceError> {
        ctx.ensure_admin()?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let request = find_request(&txn, request_id).await?;
        let shop = find_shop(&txn, request.shop_id).await?;

        ensure_transition(request.status, RestockStatus::Fulfilled)?;

        let now = Utc::now();
        let claimed = restock_request::Entity::update_many()
            .col_expr(
                restock_request::Column::Status,
                Expr::value(RestockStatus::Fulfilled.as_str()),
            )
            .col_expr(restock_request::Column::FulfilledAt, Expr::value(now))
            .col_expr(restock_request::Column::UpdatedAt, Expr::value(now))
            .filter(restock_request::Column::Id.eq(request_id))
            .filter(restock_request::Column::Status.eq(RestockStatus::ApprovedPending))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidStateTransition {
                from: request.status.as_str().to_string(),
                to: RestockStatus::Fulfilled.as_str().to_string(),
            });
        }

        // Both stock legs run on the same transaction as the claim above.
        let factory =
            StockLedger::apply_factory_delta(&txn, request.product_id, -request.requested_amount)
                .await?;
        let shop_adj = StockLedger::apply_shop_delta(
            &txn,
            request.shop_id,
            request.product_id,
            request.requested_amount,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            request_id = %request_id,
            amount = request.requested_amount,
            factory_stock = factory.new_stock,
            shop_stock = shop_adj.new_stock,
            "restock request fulfilled"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::FactoryStockAdjusted {
                product_id: request.product_id,
                previous_stock: factory.previous_stock,
                new_stock: factory.new_stock,
                delta: factory.delta,
                reason: "restock_fulfillment".to_string(),
                actor_id: Some(ctx.user_id),
            })
            .await
        {
            warn!(error = %e, "failed to enqueue factory stock event");
        }
        if let Err(e) = self
            .event_sender
            .send(Event::ShopInventoryAdjusted {
                shop_id: request.shop_id,
                product_id: request.product_id,
                previous_stock: shop_adj.previous_stock,
                new_stock: shop_adj.new_stock,
                delta: shop_adj.delta,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue shop inventory event");
        }

        let updated = find_request(self.db.as_ref(), request_id).await?;
        self.publish_status_change(ctx, &updated, request.status, shop.manager_id)
            .await;

        // Threshold sweep for both counters now that the move is committed.
        if let Err(e) = self.low_stock.evaluate_factory(&factory.product).await {
            warn!(error = %e, "factory low-stock evaluation failed");
        }
        if let Err(e) = self
            .low_stock
            .evaluate_shop(request.shop_id, request.product_id)
            .await
        {
            warn!(error = %e, "shop low-stock evaluation failed");
        }

        Ok(updated)
    }

    /// Fulfills whatever request is `approved_pending` for the pair.
    pub async fn fulfill_by_pair(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
        product_id: Uuid,
    ) -> Result<restock_request::Model, ServiceError> {
        let request = restock_request::Entity::find()
            .filter(restock_request::Column::ShopId.eq(shop_id))
            .filter(restock_request::Column::ProductId.eq(product_id))
            .filter(restock_request::Column::Status.eq(RestockStatus::ApprovedPending))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No approved pending restock request for shop {} and product {}",
                    shop_id, product_id
                ))
            })?;

        self.fulfill(ctx, request.id).await
    }

    /// Admin override: drives the request toward `target` through the same
    /// transition rules, including the fulfillment stock effects.
    #[instrument(skip(self, ctx), fields(request_id = %request_id, target = %target))]
    pub async fn update_status(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
        target: RestockStatus,
        notes: Option<String>,
    ) -> Result<restock_request::Model, ServiceError> {
        ctx.ensure_admin()?;

        match target {
            RestockStatus::ApprovedPending => self.approve(ctx, request_id).await,
            RestockStatus::Rejected => self.reject(ctx, request_id, notes).await,
            RestockStatus::Fulfilled => self.fulfill(ctx, request_id).await,
            RestockStatus::WaitingForApproval => {
                let request = find_request(self.db.as_ref(), request_id).await?;
                Err(ServiceError::InvalidStateTransition {
                    from: request.status.as_str().to_string(),
                    to: RestockStatus::WaitingForApproval.as_str().to_string(),
                })
            }
        }
    }

    /// Soft delete: hides the request from default listings without touching
    /// its status. Valid in any state.
    #[instrument(skip(self, ctx), fields(request_id = %request_id))]
    pub async fn hide(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<restock_request::Model, ServiceError> {
        ctx.ensure_admin()?;

        let db = self.db.as_ref();
        let request = find_request(db, request_id).await?;

        let mut active: restock_request::ActiveModel = request.clone().into();
        active.hidden = Set(true);
        let updated = active.update(db).await.map_err(ServiceError::DatabaseError)?;

        if let Err(e) = self
            .event_sender
            .send(Event::RestockRequestHidden {
                request_id,
                shop_id: updated.shop_id,
                actor_id: ctx.user_id,
            })
            .await
        {
            warn!(error = %e, "failed to enqueue request-hidden event");
        }

        Ok(updated)
    }

    pub async fn get(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<restock_request::Model, ServiceError> {
        let db = self.db.as_ref();
        let request = find_request(db, request_id).await?;
        let shop = find_shop(db, request.shop_id).await?;
        ensure_can_manage_shop(db, ctx, &shop).await?;
        Ok(request)
    }

    /// Lists requests for one shop, or across all shops for Admins.
    /// Hidden requests are excluded unless an Admin asks for them.
    pub async fn list(
        &self,
        ctx: &AuthContext,
        params: ListRestockRequests,
    ) -> Result<(Vec<restock_request::Model>, u64), ServiceError> {
        let db = self.db.as_ref();

        let mut query = restock_request::Entity::find();

        match params.shop_id {
            Some(shop_id) => {
                let shop = find_shop(db, shop_id).await?;
                ensure_can_manage_shop(db, ctx, &shop).await?;
                query = query.filter(restock_request::Column::ShopId.eq(shop_id));
            }
            None => ctx.ensure_admin()?,
        }

        if !(params.include_hidden && ctx.is_admin()) {
            query = query.filter(restock_request::Column::Hidden.eq(false));
        }

        let paginator = query
            .order_by_desc(restock_request::Column::CreatedAt)
            .paginate(db, params.limit.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let items = paginator
            .fetch_page(params.page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((items, total))
    }

    async fn publish_status_change(
        &self,
        ctx: &AuthContext,
        request: &restock_request::Model,
        previous_status: RestockStatus,
        manager_id: Option<Uuid>,
    ) {
        if let Err(e) = self
            .event_sender
            .send(Event::RestockRequestStatusChanged {
                request_id: request.id,
                shop_id: request.shop_id,
                product_id: request.product_id,
                requested_amount: request.requested_amount,
                previous_status: previous_status.as_str().to_string(),
                new_status: request.status.as_str().to_string(),
                actor_id: ctx.user_id,
                manager_id,
            })
            .await
        {
            warn!(error = %e, request_id = %request.id, "failed to enqueue status-change event");
        }
    }
}

fn ensure_transition(from: RestockStatus, to: RestockStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

async fn find_request<C>(db: &C, request_id: Uuid) -> Result<restock_request::Model, ServiceError>
where
    C: ConnectionTrait,
{
    restock_request::Entity::find_by_id(request_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Restock request {} not found", request_id)))
}

async fn find_shop<C>(db: &C, shop_id: Uuid) -> Result<shop::Model, ServiceError>
where
    C: ConnectionTrait,
{
    shop::Entity::find_by_id(shop_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Shop {} not found", shop_id)))
}

async fn find_product<C>(db: &C, product_id: Uuid) -> Result<product::Model, ServiceError>
where
    C: ConnectionTrait,
{
    product::Entity::find_by_id(product_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_command_rejects_non_positive_amount() {
        let cmd = CreateRestockRequest {
            shop_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            requested_amount: 0,
            request_type: RequestType::Restock,
            notes: None,
        };
        assert!(cmd.validate().is_err());

        let cmd = CreateRestockRequest {
            requested_amount: 1,
            ..cmd
        };
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn ensure_transition_maps_guard_to_error() {
        assert!(ensure_transition(
            RestockStatus::WaitingForApproval,
            RestockStatus::ApprovedPending
        )
        .is_ok());

        let err = ensure_transition(RestockStatus::Fulfilled, RestockStatus::Rejected).unwrap_err();
        match err {
            ServiceError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "fulfilled");
                assert_eq!(to, "rejected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
