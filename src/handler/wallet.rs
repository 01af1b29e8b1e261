// handler/wallet.rs
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};

use crate::{
    dtos::settlementdtos::ApiResponse,
    error::HttpError,
    middleware::JWTAuthMiddleware,
    AppState,
};

pub fn wallet_handler() -> Router {
    Router::new().route("/transactions", get(get_transaction_history))
}

pub async fn get_transaction_history(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let transactions = app_state.wallet_ledger.history(auth.user.user_id).await?;

    Ok(Json(ApiResponse::success(
        "Transaction history retrieved",
        transactions,
    )))
}
