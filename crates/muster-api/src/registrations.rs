//! Handlers for `/registrations` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/registrations/{id}` | Owner or elevated roles |
//! | `POST`   | `/registrations/{id}/approve` | |
//! | `POST`   | `/registrations/{id}/reject` | Body: `{"reason": "..."}`, reason optional |
//! | `POST`   | `/registrations/{id}/attend` | Manual check-in by an activity manager |
//! | `DELETE` | `/registrations/{id}` | Pending or rejected only; owner or Admin |
//! | `POST`   | `/registrations/bulk` | Body: `{"ids": [...], "action": "approve"\|"reject"}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use muster_core::{
  attendance,
  bulk::{self, ApprovalAction, BulkOutcome},
  lifecycle,
  registration::Registration,
  store::RosterStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::CurrentCaller, error::ApiError};

/// `GET /registrations/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Registration>, ApiError>
where
  S: RosterStore,
{
  Ok(Json(lifecycle::get_registration(store.as_ref(), id, &caller).await?))
}

/// `POST /registrations/{id}/approve`
pub async fn approve<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Registration>, ApiError>
where
  S: RosterStore,
{
  Ok(Json(lifecycle::approve(store.as_ref(), id, &caller, Utc::now()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
  #[serde(default)]
  pub reason: Option<String>,
}

/// `POST /registrations/{id}/reject`
pub async fn reject<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<RejectBody>,
) -> Result<Json<Registration>, ApiError>
where
  S: RosterStore,
{
  let reg = lifecycle::reject(store.as_ref(), id, body.reason, &caller, Utc::now()).await?;
  Ok(Json(reg))
}

/// `POST /registrations/{id}/attend`
pub async fn attend<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, ApiError>
where
  S: RosterStore,
{
  let attendance = attendance::mark_attended(store.as_ref(), id, &caller, Utc::now()).await?;
  Ok((StatusCode::CREATED, Json(attendance)))
}

/// `DELETE /registrations/{id}`
pub async fn cancel<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<StatusCode, ApiError>
where
  S: RosterStore,
{
  lifecycle::cancel(store.as_ref(), id, &caller).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub ids:    Vec<Uuid>,
  pub action: ApprovalAction,
  #[serde(default)]
  pub reason: Option<String>,
}

/// `POST /registrations/bulk`
pub async fn bulk_action<S>(
  State(store): State<Arc<S>>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<BulkBody>,
) -> Result<Json<BulkOutcome>, ApiError>
where
  S: RosterStore,
{
  let outcome = bulk::bulk_apply_approval_action(
    store.as_ref(),
    &body.ids,
    body.action,
    body.reason,
    &caller,
    Utc::now(),
  )
  .await?;
  Ok(Json(outcome))
}
