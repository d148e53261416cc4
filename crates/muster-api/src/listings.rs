//! Scoped listings: `GET /{resource}[?mine=true]`.
//!
//! The caller's [`Scope`](muster_core::scope::Scope) is resolved first and
//! handed to the store, which filters in the query. A caller with no
//! visibility gets an empty array, never an error.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use muster_core::{
  Caller,
  scope::{self, Resource},
  store::RosterStore,
};
use serde::Deserialize;

use crate::{caller::CurrentCaller, error::ApiError, store_error};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Only rows the caller owns.
  #[serde(default)]
  pub mine: bool,
}

/// `GET /{resource}`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(name): Path<String>,
  Query(params): Query<ListParams>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Response, ApiError>
where
  S: RosterStore,
{
  let resource: Resource = name
    .parse()
    .map_err(|_| ApiError::NotFound(format!("unknown resource {name:?}")))?;
  list_scoped(store.as_ref(), resource, &params, &caller).await
}

/// `GET /activities`. The route shares its path with `POST /activities`, so
/// it does not fall through to `/{resource}`.
pub async fn list_activities<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Response, ApiError>
where
  S: RosterStore,
{
  list_scoped(store.as_ref(), Resource::Activities, &params, &caller).await
}

async fn list_scoped<S: RosterStore>(
  store: &S,
  resource: Resource,
  params: &ListParams,
  caller: &Caller,
) -> Result<Response, ApiError> {
  let scope = if params.mine {
    scope::resolve_own(store, resource, caller).await
  } else {
    scope::resolve(store, resource, caller).await
  };

  let response = match resource {
    Resource::Activities => {
      let rows = store.list_activities(&scope).await.map_err(store_error)?;
      let rows: Vec<_> = rows.into_iter().map(|a| a.redacted()).collect();
      Json(rows).into_response()
    }
    Resource::Registrations => {
      Json(store.list_registrations(&scope).await.map_err(store_error)?).into_response()
    }
    Resource::Students => {
      Json(store.list_students(&scope).await.map_err(store_error)?).into_response()
    }
    Resource::Classes => {
      Json(store.list_classes(&scope).await.map_err(store_error)?).into_response()
    }
  };
  Ok(response)
}
