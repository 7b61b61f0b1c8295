use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::error::AppError;

/// Extracts the service token from the `Authorization: Bearer ...` header.
/// Whether the token is actually known is checked against the store by the
/// handler, not here.
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header value"))?;

        match value.strip_prefix("Bearer ") {
            Some(token) => Ok(BearerToken(token.to_string())),
            None => Err(AppError::Unauthorized("Expected Bearer token")),
        }
    }
}
