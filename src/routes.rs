// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        inspection::inspection_handler,
        settlement::{contract_handler, operations_handler},
        wallet::wallet_handler,
    },
    middleware::auth,
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .merge(inspection_handler())
        .merge(contract_handler())
        .merge(operations_handler())
        .nest("/wallet", wallet_handler())
        .layer(middleware::from_fn(auth));

    let api_route = Router::new()
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(app_state)),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
