//! QR check-in: the token-gated, time-windowed, idempotent transition that
//! records a student's physical attendance.
//!
//! The [`Attendance`] row is the durable source of truth. Moving the
//! registration to [`RegistrationStatus::Attended`] afterwards is a
//! best-effort projection; its failure is logged and swallowed.

use chrono::{DateTime, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Entity, Error, Result, Violation,
  activity::Activity,
  guard::can_manage_activity,
  lifecycle,
  qr,
  registration::{Registration, RegistrationStatus, Transition},
  role::Caller,
  store::RosterStore,
};

/// How an attendance was recorded.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckInMethod {
  /// The student scanned the activity's QR code.
  Qr,
  /// An activity manager marked the student present.
  Manual,
}

/// Unique per `(student_id, activity_id)`; created once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
  pub attendance_id:         Uuid,
  pub student_id:            Uuid,
  pub activity_id:           Uuid,
  pub checked_in_at:         DateTime<Utc>,
  pub checked_in_by_user_id: Uuid,
  pub method:                CheckInMethod,
}

/// Input for [`RosterStore::insert_attendance_if_absent`].
#[derive(Debug, Clone)]
pub struct NewAttendance {
  pub student_id:            Uuid,
  pub activity_id:           Uuid,
  pub checked_in_at:         DateTime<Utc>,
  pub checked_in_by_user_id: Uuid,
  pub method:                CheckInMethod,
}

// ─── QR check-in ─────────────────────────────────────────────────────────────

/// Check the calling student in to `activity_id` with a scanned `token`.
///
/// Guards, in order:
/// 1. the activity exists and has a QR token;
/// 2. `token` matches it;
/// 3. `start_at <= now <= end_at`, to the second;
/// 4. the caller is a student;
/// 5. they hold an approved registration;
/// 6. they have not checked in yet ([`Error::Conflict`]).
pub async fn check_in<S: RosterStore>(
  store: &S,
  activity_id: Uuid,
  token: &str,
  caller: &Caller,
  now: DateTime<Utc>,
) -> Result<Attendance> {
  let activity = store
    .find_activity(activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Violation::NoQrIssued)?;

  let stored = activity
    .qr_token
    .as_deref()
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(Violation::NoQrIssued)?;

  if !qr::tokens_match(stored, token) {
    tracing::debug!(activity = %activity_id, caller = %caller.id, "QR token mismatch");
    return Err(Violation::TokenMismatch.into());
  }

  check_window(&activity, now)?;

  let student = store
    .find_student_by_user(caller.id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::forbidden("only students can check in with a QR code"))?;

  let reg = store
    .find_registration_by_student_and_activity(student.student_id, activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Violation::NotRegistered)?;

  // Attended lets a repeat scan through to the uniqueness check below.
  if !matches!(reg.status, RegistrationStatus::Approved | RegistrationStatus::Attended) {
    return Err(Violation::NotApproved(reg.status).into());
  }

  record(store, &reg, caller, CheckInMethod::Qr, now).await
}

/// Compare `now` against the activity window at one-second resolution.
fn check_window(activity: &Activity, now: DateTime<Utc>) -> Result<()> {
  let now = now.timestamp();
  if now < activity.start_at.timestamp() {
    return Err(Violation::NotStarted.into());
  }
  if now > activity.end_at.timestamp() {
    return Err(Violation::AlreadyEnded.into());
  }
  Ok(())
}

/// Insert the attendance row atomically, then project the registration to
/// `Attended`.
async fn record<S: RosterStore>(
  store: &S,
  reg: &Registration,
  caller: &Caller,
  method: CheckInMethod,
  now: DateTime<Utc>,
) -> Result<Attendance> {
  let input = NewAttendance {
    student_id: reg.student_id,
    activity_id: reg.activity_id,
    checked_in_at: now,
    checked_in_by_user_id: caller.id,
    method,
  };

  let attendance = store
    .insert_attendance_if_absent(input)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::Conflict("already checked in".into()))?;

  tracing::info!(
    attendance = %attendance.attendance_id,
    student = %reg.student_id,
    activity = %reg.activity_id,
    %method,
    "checked in"
  );

  if reg.status == RegistrationStatus::Approved {
    match store
      .update_registration_status(reg.registration_id, &Transition::Attend)
      .await
    {
      Ok(Some(_)) => {}
      Ok(None) => tracing::warn!(
        registration = %reg.registration_id,
        "registration left approved state before the attended projection"
      ),
      Err(error) => tracing::warn!(
        registration = %reg.registration_id,
        %error,
        "failed to mark registration attended"
      ),
    }
  }

  Ok(attendance)
}

// ─── Manual check-in ─────────────────────────────────────────────────────────

/// Mark the student behind `registration_id` present, on behalf of an
/// activity manager. Not time-windowed; managers may record after the fact.
pub async fn mark_attended<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  caller: &Caller,
  now: DateTime<Utc>,
) -> Result<Attendance> {
  let reg = lifecycle::load(store, registration_id).await?;

  let activity = store
    .find_activity(reg.activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Activity, reg.activity_id))?;

  if !can_manage_activity(caller, &activity) {
    return Err(Error::forbidden("no authority to record attendance for this activity"));
  }

  if !matches!(reg.status, RegistrationStatus::Approved | RegistrationStatus::Attended) {
    return Err(Violation::NotApproved(reg.status).into());
  }

  record(store, &reg, caller, CheckInMethod::Manual, now).await
}

// ─── Token issuance ──────────────────────────────────────────────────────────

/// Return the activity's QR token, assigning one on first use.
///
/// Only activity managers see the token, so only they may issue it.
/// Concurrent issuers converge on whichever token the store kept.
pub async fn issue_qr_token<S: RosterStore>(
  store: &S,
  activity_id: Uuid,
  caller: &Caller,
) -> Result<String> {
  let activity = store
    .find_activity(activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Activity, activity_id))?;

  if !can_manage_activity(caller, &activity) {
    return Err(Error::forbidden("no authority to issue a QR code for this activity"));
  }

  let candidate = qr::generate_token(&mut OsRng);
  let token = store
    .set_qr_token_if_absent(activity_id, candidate)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Activity, activity_id))?;

  tracing::debug!(activity = %activity_id, by = %caller.id, "QR token issued");
  Ok(token)
}
