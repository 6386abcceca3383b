use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    db::DbPool,
    entities::{product, restock_request},
    errors::ServiceError,
    services::stock_ledger::StockLedger,
};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 100))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub unit_price: Decimal,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub total_stock: i32,
    pub min_stock_level: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub min_stock_level: Option<i32>,
    pub is_active: Option<bool>,
}

/// Stock edit accepted from the API: either a relative delta or an absolute
/// target. An absolute target is translated to a delta against the current
/// value so the ledger's guard and triggers apply to every path.
#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    pub delta: Option<i32>,
    pub absolute: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
    ledger: StockLedger,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>, ledger: StockLedger) -> Self {
        Self { db, ledger }
    }

    #[instrument(skip(self, ctx, cmd), fields(sku = %cmd.sku))]
    pub async fn create(
        &self,
        ctx: &AuthContext,
        cmd: CreateProduct,
    ) -> Result<product::Model, ServiceError> {
        ctx.ensure_admin()?;
        cmd.validate()?;

        let existing = product::Entity::find()
            .filter(product::Column::Sku.eq(cmd.sku.clone()))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product with SKU '{}' already exists",
                cmd.sku
            )));
        }

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(cmd.sku),
            name: Set(cmd.name),
            description: Set(cmd.description),
            unit_price: Set(cmd.unit_price),
            total_stock: Set(cmd.total_stock),
            min_stock_level: Set(cmd.min_stock_level),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(product_id = %model.id, "product created");
        Ok(model)
    }

    #[instrument(skip(self, ctx, cmd), fields(product_id = %product_id))]
    pub async fn update(
        &self,
        ctx: &AuthContext,
        product_id: Uuid,
        cmd: UpdateProduct,
    ) -> Result<product::Model, ServiceError> {
        ctx.ensure_admin()?;
        cmd.validate()?;

        let existing = self.get(product_id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(name) = cmd.name {
            active.name = Set(name);
        }
        if let Some(description) = cmd.description {
            active.description = Set(Some(description));
        }
        if let Some(unit_price) = cmd.unit_price {
            active.unit_price = Set(unit_price);
        }
        if let Some(min_stock_level) = cmd.min_stock_level {
            active.min_stock_level = Set(Some(min_stock_level));
        }
        if let Some(is_active) = cmd.is_active {
            active.is_active = Set(is_active);
        }

        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Adjusts factory stock through the ledger. Exactly one of `delta` or
    /// `absolute` must be given.
    #[instrument(skip(self, ctx, adjustment), fields(product_id = %product_id))]
    pub async fn set_stock(
        &self,
        ctx: &AuthContext,
        product_id: Uuid,
        adjustment: StockAdjustment,
    ) -> Result<product::Model, ServiceError> {
        ctx.ensure_admin()?;

        let delta = match (adjustment.delta, adjustment.absolute) {
            (Some(delta), None) => delta,
            (None, Some(absolute)) => {
                if absolute < 0 {
                    return Err(ServiceError::ValidationError(
                        "Absolute stock value cannot be negative".to_string(),
                    ));
                }
                let current = self.get(product_id).await?;
                absolute - current.total_stock
            }
            _ => {
                return Err(ServiceError::ValidationError(
                    "Provide exactly one of 'delta' or 'absolute'".to_string(),
                ))
            }
        };

        let reason = adjustment
            .reason
            .unwrap_or_else(|| "manual_adjustment".to_string());

        self.ledger
            .adjust_factory_stock(Some(ctx.user_id), product_id, delta, &reason)
            .await
    }

    pub async fn get(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .order_by_asc(product::Column::Sku)
            .paginate(self.db.as_ref(), limit.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let items = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((items, total))
    }

    /// Hard delete, blocked while restock requests reference the product.
    /// Deactivation is the supported removal path for products with history.
    #[instrument(skip(self, ctx), fields(product_id = %product_id))]
    pub async fn delete(&self, ctx: &AuthContext, product_id: Uuid) -> Result<(), ServiceError> {
        ctx.ensure_admin()?;

        let product = self.get(product_id).await?;

        let references = restock_request::Entity::find()
            .filter(restock_request::Column::ProductId.eq(product_id))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;
        if references > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} is referenced by {} restock request(s); deactivate it instead",
                product_id, references
            )));
        }

        product::Entity::delete_by_id(product.id)
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        info!(product_id = %product_id, "product deleted");
        Ok(())
    }
}
