use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use service_core::error::AppError;

use crate::{
    dtos::auth::{MessageResponse, VerifyEmailQuery},
    dtos::ErrorResponse,
    utils::ValidatedQuery,
    AppState,
};

use super::request_meta;

/// Verify an email address with a one-time token
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 401, description = "Unknown or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Verification"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedQuery(query): ValidatedQuery<VerifyEmailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    state
        .auth
        .verify_email(&query.token, ip.as_deref())
        .await
        .map_err(AppError::from)?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Email verified successfully".to_string(),
        }),
    ))
}
