//! HTTP handlers for identity-service.

pub mod credentials;
pub mod password;
pub mod session;
pub mod verification;

pub use credentials::*;
pub use password::*;
pub use session::*;
pub use verification::*;

use axum::http::{header, HeaderMap};

/// Origin and client address as presented by the edge proxy. The service
/// sits behind a reverse proxy, so the source address arrives in headers.
pub(crate) fn request_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        });

    (origin, ip)
}
