use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    entities::RestockStatus,
    errors::ServiceError,
    services::restock_requests::{CreateRestockRequest, ListRestockRequests},
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: RestockStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FulfillByPairBody {
    pub shop_id: Uuid,
    pub product_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/fulfill", post(fulfill_by_pair))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/fulfill", post(fulfill_request))
        .route("/:id/status", put(update_request_status))
        .route("/:id/hide", post(hide_request))
}

async fn create_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateRestockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.restock_requests.create(&ctx, payload).await?;
    Ok((StatusCode::CREATED, axum::Json(ApiResponse::success(request))))
}

async fn list_requests(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(params): Query<ListRestockRequests>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = params.page.max(1);
    let limit = params.limit.max(1);
    let (items, total) = state.services.restock_requests.list(&ctx, params).await?;
    Ok(axum::Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

async fn get_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.restock_requests.get(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn approve_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.restock_requests.approve(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn reject_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .restock_requests
        .reject(&ctx, id, payload.notes)
        .await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn fulfill_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.restock_requests.fulfill(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn fulfill_by_pair(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<FulfillByPairBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .restock_requests
        .fulfill_by_pair(&ctx, payload.shop_id, payload.product_id)
        .await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn update_request_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .restock_requests
        .update_status(&ctx, id, payload.status, payload.notes)
        .await?;
    Ok(axum::Json(ApiResponse::success(request)))
}

async fn hide_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state.services.restock_requests.hide(&ctx, id).await?;
    Ok(axum::Json(ApiResponse::success(request)))
}
