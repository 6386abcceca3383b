use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one replenishment transaction between the factory and a shop.
///
/// Approval reserves intent only; stock moves when the request is fulfilled.
/// `fulfilled` and `rejected` are terminal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum RestockStatus {
    #[sea_orm(string_value = "waiting_for_approval")]
    WaitingForApproval,
    #[sea_orm(string_value = "approved_pending")]
    ApprovedPending,
    #[sea_orm(string_value = "fulfilled")]
    Fulfilled,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl RestockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForApproval => "waiting_for_approval",
            Self::ApprovedPending => "approved_pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Rejected)
    }

    /// The transition table. Everything not listed here is invalid,
    /// including any move out of a terminal state.
    pub fn can_transition_to(&self, target: RestockStatus) -> bool {
        matches!(
            (self, target),
            (Self::WaitingForApproval, Self::ApprovedPending)
                | (Self::WaitingForApproval, Self::Rejected)
                | (Self::ApprovedPending, Self::Fulfilled)
        )
    }
}

impl std::fmt::Display for RestockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Replenishment of an existing shop item
    #[sea_orm(string_value = "restock")]
    Restock,
    /// First delivery of a product the shop has not carried before
    #[sea_orm(string_value = "inventory_add")]
    InventoryAdd,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restock => "restock",
            Self::InventoryAdd => "inventory_add",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "restock_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub shop_id: Uuid,
    pub product_id: Uuid,

    pub requested_amount: i32,

    pub request_type: RequestType,

    pub status: RestockStatus,

    pub notes: Option<String>,

    /// Soft-delete flag, orthogonal to `status`; hidden requests stay
    /// mutable and auditable but drop out of default listings.
    pub hidden: bool,

    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id"
    )]
    Shop,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
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
            if let ActiveValue::NotSet = active_model.hidden {
                active_model.hidden = Set(false);
            }
            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Some(Utc::now()));

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RestockStatus::WaitingForApproval, RestockStatus::ApprovedPending, true)]
    #[case(RestockStatus::WaitingForApproval, RestockStatus::Rejected, true)]
    #[case(RestockStatus::ApprovedPending, RestockStatus::Fulfilled, true)]
    #[case(RestockStatus::WaitingForApproval, RestockStatus::Fulfilled, false)]
    #[case(RestockStatus::ApprovedPending, RestockStatus::Rejected, false)]
    #[case(RestockStatus::ApprovedPending, RestockStatus::WaitingForApproval, false)]
    fn transition_table(
        #[case] from: RestockStatus,
        #[case] to: RestockStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(RestockStatus::Fulfilled)]
    #[case(RestockStatus::Rejected)]
    fn terminal_states_allow_no_exit(#[case] terminal: RestockStatus) {
        assert!(terminal.is_terminal());
        for target in [
            RestockStatus::WaitingForApproval,
            RestockStatus::ApprovedPending,
            RestockStatus::Fulfilled,
            RestockStatus::Rejected,
        ] {
            assert!(!terminal.can_transition_to(target));
        }
    }

    #[test]
    fn status_round_trips_through_db_value() {
        use sea_orm::ActiveEnum;
        for status in [
            RestockStatus::WaitingForApproval,
            RestockStatus::ApprovedPending,
            RestockStatus::Fulfilled,
            RestockStatus::Rejected,
        ] {
            let value = status.to_value();
            assert_eq!(RestockStatus::try_from_value(&value).unwrap(), status);
        }
    }
}
