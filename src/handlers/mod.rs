pub mod products;
pub mod restock_requests;
pub mod shops;

use crate::AppState;
use axum::Router;

/// Full `/api/v1` surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/restock-requests", restock_requests::router())
        .nest("/products", products::router())
        .nest("/shops", shops::router())
}
