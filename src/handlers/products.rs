use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    errors::ServiceError,
    services::products::{CreateProduct, StockAdjustment, UpdateProduct},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/stock", post(adjust_stock))
}

async fn list_products(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state.services.products.list(query.page, query.limit).await?;
    Ok(axum::Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, query.limit,
    ))))
}

async fn create_product(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateProduct>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, axum::Json(ApiResponse::success(product))))
}

async fn get_product(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get(id).await?;
    Ok(axum::Json(ApiResponse::success(product)))
}

async fn update_product(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProduct>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.update(&ctx, id, payload).await?;
    Ok(axum::Json(ApiResponse::success(product)))
}

/// Accepts either a relative `delta` or an `absolute` target value; both go
/// through the stock ledger so the negative-stock guard always applies.
async fn adjust_stock(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockAdjustment>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.set_stock(&ctx, id, payload).await?;
    Ok(axum::Json(ApiResponse::success(product)))
}

async fn delete_product(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.products.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
