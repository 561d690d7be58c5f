//! Caller identity. Session management itself lives upstream (the auth
//! proxy terminates the session cookie); by the time a request reaches
//! this service the proxy has stamped the authenticated user id onto
//! `x-user-id`, and the admin surface additionally checks the stamped
//! `x-user-email` against the configured allow-list.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Extractor for the authenticated user. Missing or non-UUID header
/// yields the 401-equivalent (`authRequired` in the body).
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Email stamped by the auth proxy, if any. Only the admin surface
/// cares; everything else keys off the user id.
pub fn caller_email(parts: &axum::http::HeaderMap) -> Option<String> {
    parts
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
