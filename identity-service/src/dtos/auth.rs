use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::PrincipalKind;
use crate::services::jwt::TokenResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Email (case-insensitive) or username (exact)
    #[validate(length(min = 1, message = "Identifier is required"))]
    #[schema(example = "user@example.com")]
    pub identifier: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub principal: crate::models::SanitizedPrincipal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "OK")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "refresh-token-123")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "a1b2c3d4e5f6...")]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema, IntoParams)]
pub struct VerifyEmailQuery {
    #[validate(length(min = 1, message = "Token is required"))]
    #[param(example = "abc123token")]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCredentialsRequest {
    pub target_kind: PrincipalKind,

    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub target_id: Uuid,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newpassword123", min_length = 8)]
    pub new_password: Option<String>,

    #[validate(length(equal = 6, message = "PIN must be exactly 6 digits"))]
    #[schema(example = "123456")]
    pub new_pin: Option<String>,

    #[schema(example = "oldpassword123")]
    pub current_password: Option<String>,

    #[schema(example = "654321")]
    pub current_pin: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "identity-service")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
}
