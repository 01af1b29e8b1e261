// handler/inspection.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::settlementdtos::*,
    error::{ErrorMessage, HttpError},
    middleware::JWTAuthMiddleware,
    AppState,
};

pub fn inspection_handler() -> Router {
    Router::new()
        .route("/contracts/:contract_id/inspections", get(list_inspections))
        .route("/contracts/:contract_id/inspections/start", post(start_inspection))
        .route("/contracts/:contract_id/inspections/submit-payment", post(submit_for_payment))
        .route("/inspections/:inspection_id", get(get_inspection))
        .route("/inspections/:inspection_id/complete", post(complete_inspection))
}

pub async fn start_inspection(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(contract_id): Path<Uuid>,
    Json(body): Json<StartInspectionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let inspection = app_state
        .inspection_gate
        .start(contract_id, auth.user.user_id, body.inspection_type)
        .await?;

    Ok(Json(ApiResponse::success("Inspection started", inspection)))
}

pub async fn get_inspection(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(inspection_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let inspection = app_state.inspection_gate.get(inspection_id).await?;

    if inspection.driver_user_id != auth.user.user_id && !auth.is_operations() {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(Json(ApiResponse::success("Inspection retrieved", inspection)))
}

pub async fn complete_inspection(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(inspection_id): Path<Uuid>,
    Json(body): Json<CompleteInspectionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let inspection = app_state
        .inspection_gate
        .complete(inspection_id, auth.user.user_id, body.into())
        .await?;

    Ok(Json(ApiResponse::success("Inspection completed", inspection)))
}

/// Submits the driver's pre/post pair and kicks off payout preparation for
/// the contract tree in the background.
pub async fn submit_for_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let submitted = app_state
        .inspection_gate
        .submit_for_payment(contract_id, auth.user.user_id)
        .await?;

    let payout_engine = app_state.payout_engine.clone();
    tokio::spawn(async move {
        match payout_engine.prepare_payouts(contract_id).await {
            Ok(payouts) => tracing::info!(
                contract_id = %contract_id,
                "Prepared {} payouts after inspection submission",
                payouts.len()
            ),
            Err(e) => tracing::warn!(
                contract_id = %contract_id,
                "Payout preparation after inspection submission failed: {}",
                e
            ),
        }
    });

    Ok(Json(ApiResponse::success(
        "Inspections submitted for payment",
        submitted,
    )))
}

pub async fn list_inspections(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(contract_id): Path<Uuid>,
    Query(query): Query<InspectionQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    // Drivers only see their own history.
    let driver_user_id = if auth.is_operations() {
        query.driver_user_id
    } else {
        Some(auth.user.user_id)
    };

    let inspections = app_state
        .inspection_gate
        .list(contract_id, driver_user_id)
        .await?;

    Ok(Json(ApiResponse::success("Inspections retrieved", inspections)))
}
