use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{ensure_can_manage_shop, AuthContext},
    db::DbPool,
    entities::{shop, shop_assignment, shop_inventory},
    errors::ServiceError,
};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateShop {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInventorySettings {
    pub min_stock_per_item: Option<i32>,
    #[serde(default)]
    pub clear_min_stock_per_item: bool,
    pub low_stock_alerts_enabled: Option<bool>,
}

#[derive(Clone)]
pub struct ShopService {
    db: Arc<DbPool>,
}

impl ShopService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx, cmd))]
    pub async fn create(
        &self,
        ctx: &AuthContext,
        cmd: CreateShop,
    ) -> Result<shop::Model, ServiceError> {
        ctx.ensure_admin()?;
        cmd.validate()?;

        let model = shop::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(cmd.name),
            manager_id: Set(cmd.manager_id),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::DatabaseError)?;

        if let Some(manager_id) = cmd.manager_id {
            self.insert_assignment(model.id, manager_id).await?;
        }

        info!(shop_id = %model.id, "shop created");
        Ok(model)
    }

    /// Assigns a manager: records the authoritative membership row and keeps
    /// the derived `manager_id` pointer in sync.
    #[instrument(skip(self, ctx), fields(shop_id = %shop_id, user_id = %user_id))]
    pub async fn assign_manager(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
        user_id: Uuid,
    ) -> Result<shop::Model, ServiceError> {
        ctx.ensure_admin()?;

        let shop = self.get_unscoped(shop_id).await?;
        self.insert_assignment(shop_id, user_id).await?;

        let mut active: shop::ActiveModel = shop.into();
        active.manager_id = Set(Some(user_id));
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get(&self, ctx: &AuthContext, shop_id: Uuid) -> Result<shop::Model, ServiceError> {
        let shop = self.get_unscoped(shop_id).await?;
        ensure_can_manage_shop(self.db.as_ref(), ctx, &shop).await?;
        Ok(shop)
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<shop::Model>, u64), ServiceError> {
        ctx.ensure_admin()?;

        let paginator = shop::Entity::find()
            .order_by_asc(shop::Column::Name)
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

    #[instrument(skip(self, ctx), fields(shop_id = %shop_id))]
    pub async fn deactivate(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
    ) -> Result<shop::Model, ServiceError> {
        ctx.ensure_admin()?;

        let shop = self.get_unscoped(shop_id).await?;
        let mut active: shop::ActiveModel = shop.into();
        active.is_active = Set(false);
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Active inventory rows for one shop.
    pub async fn list_inventory(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<shop_inventory::Model>, u64), ServiceError> {
        let shop = self.get_unscoped(shop_id).await?;
        ensure_can_manage_shop(self.db.as_ref(), ctx, &shop).await?;

        let paginator = shop_inventory::Entity::find()
            .filter(shop_inventory::Column::ShopId.eq(shop_id))
            .filter(shop_inventory::Column::IsActive.eq(true))
            .order_by_asc(shop_inventory::Column::CreatedAt)
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

    /// Updates the low-stock threshold override and alert flag for a pair.
    #[instrument(skip(self, ctx, cmd), fields(shop_id = %shop_id, product_id = %product_id))]
    pub async fn update_inventory_settings(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
        product_id: Uuid,
        cmd: UpdateInventorySettings,
    ) -> Result<shop_inventory::Model, ServiceError> {
        let shop = self.get_unscoped(shop_id).await?;
        ensure_can_manage_shop(self.db.as_ref(), ctx, &shop).await?;

        let inventory = self.find_inventory(shop_id, product_id).await?;
        let mut active: shop_inventory::ActiveModel = inventory.into();

        if cmd.clear_min_stock_per_item {
            active.min_stock_per_item = Set(None);
        } else if let Some(threshold) = cmd.min_stock_per_item {
            if threshold < 0 {
                return Err(ServiceError::ValidationError(
                    "Threshold cannot be negative".to_string(),
                ));
            }
            active.min_stock_per_item = Set(Some(threshold));
        }
        if let Some(enabled) = cmd.low_stock_alerts_enabled {
            active.low_stock_alerts_enabled = Set(enabled);
        }

        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Soft-deletes an inventory row; the core never hard-deletes them.
    #[instrument(skip(self, ctx), fields(shop_id = %shop_id, product_id = %product_id))]
    pub async fn remove_inventory(
        &self,
        ctx: &AuthContext,
        shop_id: Uuid,
        product_id: Uuid,
    ) -> Result<shop_inventory::Model, ServiceError> {
        let shop = self.get_unscoped(shop_id).await?;
        ensure_can_manage_shop(self.db.as_ref(), ctx, &shop).await?;

        let inventory = self.find_inventory(shop_id, product_id).await?;
        let mut active: shop_inventory::ActiveModel = inventory.into();
        active.is_active = Set(false);
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    async fn get_unscoped(&self, shop_id: Uuid) -> Result<shop::Model, ServiceError> {
        shop::Entity::find_by_id(shop_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Shop {} not found", shop_id)))
    }

    async fn find_inventory(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
    ) -> Result<shop_inventory::Model, ServiceError> {
        shop_inventory::Entity::find()
            .filter(shop_inventory::Column::ShopId.eq(shop_id))
            .filter(shop_inventory::Column::ProductId.eq(product_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Inventory for shop {} and product {} not found",
                    shop_id, product_id
                ))
            })
    }

    async fn insert_assignment(&self, shop_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let existing = shop_assignment::Entity::find()
            .filter(shop_assignment::Column::ShopId.eq(shop_id))
            .filter(shop_assignment::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;
        if existing.is_some() {
            return Ok(());
        }

        shop_assignment::ActiveModel {
            shop_id: Set(shop_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::DatabaseError)?;

        Ok(())
    }
}
