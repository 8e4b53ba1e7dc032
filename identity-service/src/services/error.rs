use service_core::error::AppError;
use thiserror::Error;

use crate::models::PrincipalStatus;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Unknown identifier and wrong password deliberately share one message.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is {}", .0.as_str().to_lowercase())]
    AccountDisabled(PrincipalStatus),

    #[error("Request origin is not whitelisted")]
    OriginNotWhitelisted,

    #[error("Request address is not whitelisted")]
    IpNotWhitelisted,

    #[error("Too many attempts, try again later")]
    TooManyAttempts { retry_after_seconds: u64 },

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    NotPermitted(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountDisabled(status) => AppError::Unauthorized(anyhow::anyhow!(
                "Account is {}",
                status.as_str().to_lowercase()
            )),
            ServiceError::OriginNotWhitelisted => {
                AppError::Forbidden(anyhow::anyhow!("Request origin is not whitelisted"))
            }
            ServiceError::IpNotWhitelisted => {
                AppError::Forbidden(anyhow::anyhow!("Request address is not whitelisted"))
            }
            ServiceError::TooManyAttempts {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "Too many attempts, try again later".to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::NotPermitted(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::App(e) => e,
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
