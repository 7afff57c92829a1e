use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::error::ApiError;

pub const USER_ID_HEADER: &str = "userId";

/// User on whose behalf a request is made, read from the `userId` header.
///
/// Authentication happens upstream at the gateway; this service only forwards
/// the identity to engines and notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", USER_ID_HEADER)))
    }
}
