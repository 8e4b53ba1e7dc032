use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LoginResponse, MessageResponse, RefreshRequest},
    dtos::ErrorResponse,
    middleware::AuthUser,
    services::TokenResponse,
    utils::ValidatedJson,
    AppState,
};

use super::request_meta;

/// Login with an email or username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials or disabled account", body = ErrorResponse),
        (status = 403, description = "Origin or address not whitelisted", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Session"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (origin, ip) = request_meta(&headers);
    let outcome = state
        .auth
        .login(&req.identifier, &req.password, origin.as_deref(), ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            tokens: outcome.tokens.into_response(),
            principal: outcome.principal,
        }),
    ))
}

/// Logout: revoke the access token and drop the refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out successfully", body = MessageResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Session",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    state
        .auth
        .logout(&user.0, ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = TokenResponse),
        (status = 401, description = "Invalid, replayed or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Session"
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    let tokens = state
        .auth
        .refresh(&req.refresh_token, ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((StatusCode::OK, Json(tokens.into_response())))
}
