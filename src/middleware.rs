use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    utils::token,
    AppState,
};

/// Roles allowed to move money: fund and settle escrows, prepare and execute payouts.
pub const OPERATIONS_ROLES: &[&str] = &["admin", "finance"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddleware {
    pub user: AuthenticatedUser,
}

impl JWTAuthMiddleware {
    pub fn is_operations(&self) -> bool {
        OPERATIONS_ROLES.contains(&self.user.role.as_str())
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer ").map(str::to_owned))
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get("token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(&req))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = token::decode_token(token, app_state.env.jwt_secret.as_bytes())?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    req.extensions_mut().insert(JWTAuthMiddleware {
        user: AuthenticatedUser {
            user_id,
            role: claims.role,
        },
    });

    Ok(next.run(req).await)
}

pub async fn require_role(
    req: Request,
    next: Next,
    required_roles: &'static [&'static str],
) -> Result<impl IntoResponse, HttpError> {
    let auth = req
        .extensions()
        .get::<JWTAuthMiddleware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&auth.user.role.as_str()) {
        tracing::warn!(
            user_id = %auth.user.user_id,
            role = %auth.user.role,
            path = %req.uri().path(),
            "Rejected request without an operations role"
        );
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(next.run(req).await)
}
