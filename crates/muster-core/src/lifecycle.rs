//! The registration workflow: create, approve, reject, cancel.
//!
//! Guards are evaluated in a fixed order and each failure propagates
//! unmodified. The final write is always a conditional statement in the
//! store; if it loses a race the row is re-read to report why.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Entity, Error, Result, Violation,
  activity::ActivityStatus,
  guard::{self, approval_authority},
  registration::{
    NewRegistration, Registration, RegistrationInsert, RegistrationStatus, Transition,
  },
  role::{Caller, Role},
  scope::Resource,
  store::RosterStore,
};

/// Stored when a rejection comes without a reason.
pub const DEFAULT_REJECTION_REASON: &str = "does not meet the activity requirements";

// ─── Create ──────────────────────────────────────────────────────────────────

/// Register `student_id` for `activity_id`.
///
/// Fails with [`Error::Validation`] if the activity is missing or not
/// approved, the deadline has passed, the activity is full, or the pair is
/// already registered. Capacity and uniqueness are enforced atomically by the
/// store.
pub async fn create<S: RosterStore>(
  store: &S,
  student_id: Uuid,
  activity_id: Uuid,
  now: DateTime<Utc>,
) -> Result<Registration> {
  let activity = store
    .find_activity(activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Violation::ActivityNotFound)?;

  if activity.status != ActivityStatus::Approved {
    return Err(Violation::ActivityNotApproved.into());
  }
  if now > activity.registration_deadline {
    return Err(Violation::DeadlinePassed.into());
  }

  store
    .find_student(student_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Student, student_id))?;

  let input = NewRegistration {
    student_id,
    activity_id,
    created_at: now,
    capacity: activity.capacity,
  };

  match store.create_registration(input).await.map_err(Error::store)? {
    RegistrationInsert::Created(reg) => {
      tracing::info!(
        registration = %reg.registration_id,
        student = %student_id,
        activity = %activity_id,
        "registration created"
      );
      Ok(reg)
    }
    RegistrationInsert::Duplicate => Err(Violation::AlreadyRegistered.into()),
    RegistrationInsert::Full => Err(Violation::CapacityReached.into()),
  }
}

/// Register the calling student for `activity_id`.
pub async fn register<S: RosterStore>(
  store: &S,
  caller: &Caller,
  activity_id: Uuid,
  now: DateTime<Utc>,
) -> Result<Registration> {
  if caller.role == Role::Teacher {
    return Err(Error::forbidden("teachers cannot register for activities"));
  }

  let student = store
    .find_student_by_user(caller.id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::forbidden("only students can register for activities"))?;

  create(store, student.student_id, activity_id, now).await
}

// ─── Approve / reject ────────────────────────────────────────────────────────

/// Approve a registration. Authority is re-derived from current class
/// membership on every call.
pub async fn approve<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  caller: &Caller,
  now: DateTime<Utc>,
) -> Result<Registration> {
  let reg = load(store, registration_id).await?;
  ensure_approval_authority(store, &reg, caller).await?;

  let transition = Transition::Approve { approver_id: caller.id, at: now };
  check_eligible(&transition, reg.status)?;
  apply(store, registration_id, &transition).await
}

/// Reject a registration from any non-terminal status.
pub async fn reject<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  reason: Option<String>,
  caller: &Caller,
  now: DateTime<Utc>,
) -> Result<Registration> {
  let reg = load(store, registration_id).await?;
  ensure_approval_authority(store, &reg, caller).await?;

  let transition = Transition::Reject {
    approver_id: caller.id,
    at:          now,
    reason:      rejection_reason(reason),
  };
  check_eligible(&transition, reg.status)?;
  apply(store, registration_id, &transition).await
}

pub(crate) fn rejection_reason(reason: Option<String>) -> String {
  reason
    .map(|r| r.trim().to_owned())
    .filter(|r| !r.is_empty())
    .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_owned())
}

async fn ensure_approval_authority<S: RosterStore>(
  store: &S,
  reg: &Registration,
  caller: &Caller,
) -> Result<()> {
  if approval_authority(store, reg, caller).await? {
    Ok(())
  } else {
    Err(Error::forbidden("no authority over this registration"))
  }
}

/// Map an ineligible current status onto the violation reported to callers.
pub(crate) fn check_eligible(transition: &Transition, current: RegistrationStatus) -> Result<()> {
  if transition.allows(current) {
    return Ok(());
  }
  let violation = match (transition, current) {
    (Transition::Approve { .. }, RegistrationStatus::Approved) => Violation::AlreadyApproved,
    _ => Violation::InvalidTransition { from: current, to: transition.target() },
  };
  Err(violation.into())
}

/// Apply the conditional update, re-reading the row if it was lost.
pub(crate) async fn apply<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  transition: &Transition,
) -> Result<Registration> {
  if let Some(updated) = store
    .update_registration_status(registration_id, transition)
    .await
    .map_err(Error::store)?
  {
    tracing::info!(
      registration = %registration_id,
      status = %updated.status,
      "registration status changed"
    );
    return Ok(updated);
  }

  let current = load(store, registration_id).await?;
  check_eligible(transition, current.status)?;
  // Changed and changed back between the update and the re-read.
  Err(Violation::InvalidTransition { from: current.status, to: transition.target() }.into())
}

// ─── Cancel ──────────────────────────────────────────────────────────────────

/// Withdraw a registration. Only the owning student or an Admin may cancel,
/// and only while the registration is pending or rejected; approved and
/// attended registrations are kept.
pub async fn cancel<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  caller: &Caller,
) -> Result<()> {
  let reg = load(store, registration_id).await?;

  if !caller.role.is_admin() {
    let owner = store.find_student(reg.student_id).await.map_err(Error::store)?;
    if !owner.is_some_and(|s| s.user_id == caller.id) {
      return Err(Error::forbidden("only the owner can cancel a registration"));
    }
  }

  if !reg.status.is_cancellable() {
    return Err(Violation::NotCancellable(reg.status).into());
  }

  if store
    .delete_registration_if_cancellable(registration_id)
    .await
    .map_err(Error::store)?
  {
    tracing::info!(registration = %registration_id, by = %caller.id, "registration cancelled");
    return Ok(());
  }

  // A concurrent approval won.
  let current = load(store, registration_id).await?;
  Err(Violation::NotCancellable(current.status).into())
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Fetch one registration, gated by the access guard.
pub async fn get_registration<S: RosterStore>(
  store: &S,
  registration_id: Uuid,
  caller: &Caller,
) -> Result<Registration> {
  guard::ensure_access(store, Resource::Registrations, registration_id, caller).await?;
  load(store, registration_id).await
}

pub(crate) async fn load<S: RosterStore>(store: &S, registration_id: Uuid) -> Result<Registration> {
  store
    .find_registration(registration_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Registration, registration_id))
}
