//! Handlers for `/activities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/activities` | Body: [`NewActivity`]; monitors' activities start pending |
//! | `GET`  | `/activities/{id}` | 404 if missing, 403 without access |
//! | `POST` | `/activities/{id}/approve` | Admin or the class's homeroom teacher |
//! | `POST` | `/activities/{id}/reject` | Body: `{"reason": "..."}`, reason optional |
//! | `POST` | `/activities/{id}/qr` | Returns `{"token": ...}`, issuing one on first call |
//! | `POST` | `/activities/{id}/registrations` | Registers the calling student |
//! | `POST` | `/activities/{id}/attendance` | Body: `{"token": "..."}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use muster_core::{
  Caller, Entity,
  activity::{self, Activity, NewActivity},
  attendance,
  guard::{self, can_manage_activity},
  lifecycle,
  scope::Resource,
  store::RosterStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
  caller::CurrentCaller, error::ApiError, registrations::RejectBody, store_error,
};

/// Hide the QR token from anyone who does not manage the activity.
fn visible_to(caller: &Caller, activity: Activity) -> Activity {
  if can_manage_activity(caller, &activity) { activity } else { activity.redacted() }
}

// ─── Propose ─────────────────────────────────────────────────────────────────

/// `POST /activities`
pub async fn propose<S>(
  State(store): State<Arc<S>>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<NewActivity>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RosterStore,
{
  let created = activity::propose(store.as_ref(), &caller, body).await?;
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /activities/{id}`. The QR token is only shown to managers.
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Activity>, ApiError>
where
  S: RosterStore,
{
  guard::ensure_access(store.as_ref(), Resource::Activities, id, &caller).await?;
  let activity = store
    .find_activity(id)
    .await
    .map_err(store_error)?
    .ok_or_else(|| muster_core::Error::NotFound(Entity::Activity, id))?;

  Ok(Json(visible_to(&caller, activity)))
}

// ─── Review ──────────────────────────────────────────────────────────────────

/// `POST /activities/{id}/approve`
pub async fn approve<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<Json<Activity>, ApiError>
where
  S: RosterStore,
{
  let reviewed = activity::approve_activity(store.as_ref(), id, &caller).await?;
  Ok(Json(visible_to(&caller, reviewed)))
}

/// `POST /activities/{id}/reject`
pub async fn reject<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<RejectBody>,
) -> Result<Json<Activity>, ApiError>
where
  S: RosterStore,
{
  let reviewed = activity::reject_activity(store.as_ref(), id, body.reason, &caller).await?;
  Ok(Json(visible_to(&caller, reviewed)))
}

// ─── QR token ────────────────────────────────────────────────────────────────

/// `POST /activities/{id}/qr`
pub async fn issue_qr<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, ApiError>
where
  S: RosterStore,
{
  let token = attendance::issue_qr_token(store.as_ref(), id, &caller).await?;
  Ok(Json(json!({ "token": token })))
}

// ─── Register ────────────────────────────────────────────────────────────────

/// `POST /activities/{id}/registrations`
pub async fn register<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, ApiError>
where
  S: RosterStore,
{
  let reg = lifecycle::register(store.as_ref(), &caller, id, Utc::now()).await?;
  Ok((StatusCode::CREATED, Json(reg)))
}

// ─── Check in ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckInBody {
  pub token: String,
}

/// `POST /activities/{id}/attendance`
pub async fn check_in<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  CurrentCaller(caller): CurrentCaller,
  Json(body): Json<CheckInBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RosterStore,
{
  let attendance =
    attendance::check_in(store.as_ref(), id, &body.token, &caller, Utc::now()).await?;
  Ok((StatusCode::CREATED, Json(attendance)))
}
