//! # Caller Identity
//!
//! The HTTP framing layer in front of the broker authenticates agents and
//! stamps the caller's identifier into the `x-ainp-did` header; here we
//! only extract and validate its shape. Handlers that require identity
//! take [`CallerDid`] and get a `401` for free when it is absent.

use crate::error::ApiError;
use ainp_types::Did;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the authenticated caller identifier.
pub const DID_HEADER: &str = "x-ainp-did";

/// Extractor for the authenticated caller.
#[derive(Debug, Clone)]
pub struct CallerDid(pub Did);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for CallerDid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(DID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(ApiError::unauthenticated)?;
        let did = Did::parse(value).map_err(|_| ApiError::unauthenticated())?;
        Ok(CallerDid(did))
    }
}
