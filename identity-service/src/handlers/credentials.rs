use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use service_core::error::AppError;

use crate::{
    dtos::auth::{MessageResponse, UpdateCredentialsRequest},
    dtos::ErrorResponse,
    middleware::AuthUser,
    services::CredentialUpdate,
    utils::ValidatedJson,
    AppState,
};

use super::request_meta;

/// Update a principal's password and/or transaction PIN
///
/// Self-service updates require the current secret; hierarchy operators
/// reissue credentials for the principals they are allowed to administer.
#[utoipa::path(
    put,
    path = "/auth/credentials",
    request_body = UpdateCredentialsRequest,
    responses(
        (status = 200, description = "Credentials updated", body = MessageResponse),
        (status = 401, description = "Invalid token or wrong current secret", body = ErrorResponse),
        (status = 403, description = "Actor may not administer this principal", body = ErrorResponse),
        (status = 404, description = "Target principal not found", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Credentials",
    security(("bearer_auth" = []))
)]
pub async fn update_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateCredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (_, ip) = request_meta(&headers);
    let claims = user.0;

    // The token names the actor; re-read it so positional checks see the
    // current hierarchy, not the one at issuance time.
    let actor = state
        .auth
        .store()
        .resolve_by_id(claims.kind, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Acting principal no longer exists")))?;

    state
        .credentials
        .update_credentials(
            &actor,
            req.target_kind,
            req.target_id,
            CredentialUpdate {
                new_password: req.new_password,
                new_pin: req.new_pin,
                current_password: req.current_password,
                current_pin: req.current_pin,
            },
            ip.as_deref(),
        )
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Credentials updated".to_string(),
        }),
    ))
}
