//! Caller identity, as asserted by the upstream authenticator.
//!
//! Authentication happens in front of this service. The authenticated user
//! id and role arrive as the `x-user-id` and `x-user-role` headers; the role
//! label is normalised with [`muster_core::role::normalize_role`].

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use muster_core::{Caller, role::normalize_role};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
pub struct CurrentCaller(pub Caller);

/// Read the caller from request headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
  };

  let id = header(USER_ID_HEADER)?
    .trim()
    .parse::<Uuid>()
    .map_err(|_| ApiError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;

  let raw_role = header(USER_ROLE_HEADER)?;
  let role = normalize_role(raw_role)
    .ok_or_else(|| ApiError::Unauthorized(format!("unknown role {raw_role:?}")))?;

  Ok(Caller::new(id, role))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentCaller {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    caller_from_headers(&parts.headers).map(CurrentCaller)
  }
}
