use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A retail shop drawing stock from the factory pool.
///
/// `manager_id` is a derived convenience pointer; the authoritative
/// membership relation is `shop_assignments`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "shops")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Shop name must be between 1 and 255 characters"
    ))]
    pub name: String,

    pub manager_id: Option<Uuid>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::shop_inventory::Entity")]
    ShopInventories,
    #[sea_orm(has_many = "super::restock_request::Entity")]
    RestockRequests,
    #[sea_orm(has_many = "super::shop_assignment::Entity")]
    ShopAssignments,
}

impl Related<super::shop_inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShopInventories.def()
    }
}

impl Related<super::restock_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RestockRequests.def()
    }
}

impl Related<super::shop_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShopAssignments.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Some(Utc::now()));

        Ok(active_model)
    }
}
