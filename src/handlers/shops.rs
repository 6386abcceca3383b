use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    errors::ServiceError,
    services::shops::{CreateShop, UpdateInventorySettings},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct AssignManagerBody {
    pub user_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_shops).post(create_shop))
        .route("/:id", get(get_shop).delete(deactivate_shop))
        .route("/:id/manager", post(assign_manager))
        .route("/:id/inventory", get(list_inventory))
        .route(
            "/:id/inventory/:product_id/settings",
            put(update_inventory_settings),
        )
        .route("/:id/inventory/:product_id", delete(remove_inventory))
}

async fn create_shop(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateShop>,
) -> Result<impl IntoResponse, ServiceError> {
    let shop = state.services.shops.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, axum::Json(ApiResponse::success(shop))))
}

async fn list_shops(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .shops
        .list(&ctx, query.page, query.limit)
        .await?;
    Ok(axum::Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, query.limit,
    ))))
}

async fn get_shop(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let shop = state.services.shops.get(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(shop)))
}

async fn deactivate_shop(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let shop = state.services.shops.deactivate(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(shop)))
}

async fn assign_manager(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignManagerBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let shop = state
        .services
        .shops
        .assign_manager(&ctx, id, payload.user_id)
        .await?;
    Ok(axum::Json(ApiResponse::success(shop)))
}

async fn list_inventory(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .shops
        .list_inventory(&ctx, id, query.page, query.limit)
        .await?;
    Ok(axum::Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, query.limit,
    ))))
}

async fn update_inventory_settings(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateInventorySettings>,
) -> Result<impl IntoResponse, ServiceError> {
    let inventory = state
        .services
        .shops
        .update_inventory_settings(&ctx, id, product_id, payload)
        .await?;
    Ok(axum::Json(ApiResponse::success(inventory)))
}

async fn remove_inventory(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let inventory = state
        .services
        .shops
        .remove_inventory(&ctx, id, product_id)
        .await?;
    Ok(axum::Json(ApiResponse::success(inventory)))
}
