use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use service_core::error::AppError;

use crate::{
    dtos::auth::{MessageResponse, PasswordResetConfirm, PasswordResetRequest},
    dtos::ErrorResponse,
    utils::ValidatedJson,
    AppState,
};

use super::request_meta;

/// Request a password-reset link
///
/// The response is the same whether or not the address belongs to an
/// account.
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    state
        .auth
        .request_password_reset(&req.email, ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "If the account exists, a reset link has been sent".to_string(),
        }),
    ))
}

/// Confirm a password reset
///
/// Consumes the one-time token and delivers freshly generated credentials
/// out of band.
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "New credentials issued", body = MessageResponse),
        (status = 401, description = "Unknown or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    state
        .auth
        .confirm_password_reset(&req.token, ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "New credentials have been sent to your email".to_string(),
        }),
    ))
}
