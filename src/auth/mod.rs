//! Caller identity, as resolved by the upstream auth gateway.
//!
//! Token issuance and verification live outside this service; requests arrive
//! with the resolved identity in trusted headers and everything here is about
//! role and shop-scope checks against that identity.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{shop, shop_assignment},
    errors::ServiceError,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Role {
    #[serde(rename = "Admin")]
    #[strum(serialize = "Admin")]
    Admin,
    #[serde(rename = "Shop_Owner")]
    #[strum(serialize = "Shop_Owner")]
    ShopOwner,
}

/// Resolved caller identity attached to every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn ensure_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator role required".to_string(),
            ))
        }
    }
}

/// Whether the caller may act on behalf of the given shop.
///
/// Admins always may. Shop owners qualify through the derived manager
/// pointer or through a shop assignment row.
pub async fn can_manage_shop<C>(
    db: &C,
    ctx: &AuthContext,
    shop: &shop::Model,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    if ctx.is_admin() {
        return Ok(true);
    }

    if shop.manager_id == Some(ctx.user_id) {
        return Ok(true);
    }

    let assigned = shop_assignment::Entity::find()
        .filter(shop_assignment::Column::ShopId.eq(shop.id))
        .filter(shop_assignment::Column::UserId.eq(ctx.user_id))
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(assigned.is_some())
}

pub async fn ensure_can_manage_shop<C>(
    db: &C,
    ctx: &AuthContext,
    shop: &shop::Model,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if can_manage_shop(db, ctx, shop).await? {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "User {} does not manage shop {}",
            ctx.user_id, shop.id
        )))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("Missing or invalid caller identity".to_string())
            })?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Role>().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("Missing or invalid caller role".to_string())
            })?;

        Ok(AuthContext::new(user_id, role))
    }
}
