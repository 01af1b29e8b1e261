// handler/settlement.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Request},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::ContractExt,
    dtos::settlementdtos::*,
    error::{ErrorMessage, HttpError},
    middleware::{require_role, JWTAuthMiddleware, OPERATIONS_ROLES},
    AppState,
};

/// Carrier-facing contract graph routes.
pub fn contract_handler() -> Router {
    Router::new()
        .route("/contracts/:contract_id/sub-contracts", post(create_sub_contract))
        .route("/contracts/:contract_id/tree", get(get_contract_tree))
}

/// Escrow and payout operations, restricted to admin and finance.
pub fn operations_handler() -> Router {
    Router::new()
        .route("/escrows", post(fund_escrow))
        .route("/escrows/:escrow_id", get(get_escrow))
        .route("/escrows/:escrow_id/hold", post(confirm_escrow_hold))
        .route("/escrows/:escrow_id/release", post(release_escrow))
        .route("/escrows/:escrow_id/refund", post(refund_escrow))
        .route("/contracts/:contract_id/payouts/prepare", post(prepare_payouts))
        .route("/contracts/:contract_id/payouts", get(list_payouts))
        .route("/payouts/:payout_id/execute", post(execute_payout))
        .route_layer(middleware::from_fn(|req: Request, next: Next| {
            require_role(req, next, OPERATIONS_ROLES)
        }))
}

// Contract graph handlers
pub async fn create_sub_contract(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(contract_id): Path<Uuid>,
    Json(body): Json<CreateSubContractDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let parent = app_state
        .db_client
        .get_contract(contract_id)
        .await?
        .ok_or_else(|| HttpError::not_found("Contract not found"))?;

    // Only the carrier holding the contract may re-share it.
    if parent.hired_user_id != auth.user.user_id && !auth.is_operations() {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    let link = app_state
        .contract_graph
        .create_sub_contract(
            parent.id,
            body.reshared_job_id,
            body.split_percentage.clone(),
            body.recipient_user_id,
            body.commission_override(),
        )
        .await?;

    Ok(Json(ApiResponse::success("Sub-contract created", link)))
}

pub async fn get_contract_tree(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let root = app_state.contract_graph.root_of(contract_id).await?;
    let tree = app_state.contract_graph.resolve_tree(root.id).await?;

    let participant = tree
        .nodes()
        .iter()
        .any(|node| node.contract.hired_user_id == auth.user.user_id);
    if !participant && !auth.is_operations() {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(Json(ApiResponse::success("Contract tree resolved", tree)))
}

// Escrow handlers
pub async fn fund_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<FundEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let target = body.target().map_err(HttpError::bad_request)?;
    let escrow = app_state.escrow_ledger.fund(target, body.amount).await?;

    tracing::info!(
        escrow_id = %escrow.id,
        funded_by = %auth.user.user_id,
        "Escrow funding recorded"
    );

    Ok(Json(ApiResponse::success("Escrow funded", escrow)))
}

pub async fn get_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(escrow_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let escrow = app_state.escrow_ledger.get(escrow_id).await?;

    Ok(Json(ApiResponse::success("Escrow retrieved", escrow)))
}

pub async fn confirm_escrow_hold(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(escrow_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let escrow = app_state.escrow_ledger.confirm_hold(escrow_id).await?;

    Ok(Json(ApiResponse::success("Escrow funds held", escrow)))
}

pub async fn release_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(escrow_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let escrow = app_state.escrow_ledger.release(escrow_id).await?;

    Ok(Json(ApiResponse::success("Escrow released", escrow)))
}

pub async fn refund_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(escrow_id): Path<Uuid>,
    Json(body): Json<RefundEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let escrow = app_state.escrow_ledger.refund(escrow_id, body.reason).await?;

    Ok(Json(ApiResponse::success("Escrow refunded", escrow)))
}

// Payout handlers
pub async fn prepare_payouts(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payouts = app_state.payout_engine.prepare_payouts(contract_id).await?;

    Ok(Json(ApiResponse::success("Payouts prepared", payouts)))
}

pub async fn list_payouts(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payouts = app_state.payout_engine.list_payouts(contract_id).await?;

    Ok(Json(ApiResponse::success("Payouts retrieved", payouts)))
}

pub async fn execute_payout(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(payout_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payout = app_state.payout_engine.execute_payout(payout_id).await?;

    Ok(Json(ApiResponse::success("Payout executed", payout)))
}
