//! Activities students register for, and their review workflow.
//!
//! ```text
//! propose ──▶ Pending ──approve──▶ Approved
//!                │
//!                └────reject────▶ Rejected
//! ```
//!
//! Teachers and Admins publish directly as `Approved`. A class monitor's
//! proposal waits as `Pending` until an Admin or the class's homeroom teacher
//! reviews it. Reviews are conditional updates on `Pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Entity, Error, Result, Violation,
  guard::can_review_activity,
  lifecycle::rejection_reason,
  role::{Caller, Role},
  store::RosterStore,
};

/// Review status of an activity. Only approved activities take registrations.
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
pub enum ActivityStatus {
  Pending,
  Approved,
  Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
  pub activity_id:           Uuid,
  pub title:                 String,
  pub creator_user_id:       Uuid,
  /// `None` means institution-wide.
  pub class_id:              Option<Uuid>,
  pub status:                ActivityStatus,
  pub start_at:              DateTime<Utc>,
  pub end_at:                DateTime<Utc>,
  pub registration_deadline: DateTime<Utc>,
  /// Maximum number of pending + approved registrations; `None` is unbounded.
  pub capacity:              Option<u32>,
  /// Check-in token, assigned lazily by [`crate::attendance::issue_qr_token`].
  #[serde(skip_serializing_if = "Option::is_none")]
  pub qr_token:              Option<String>,
  /// Set when a reviewer rejects the activity.
  pub rejection_reason:      Option<String>,
}

impl Activity {
  /// The activity with its check-in token removed, for listings.
  pub fn redacted(mut self) -> Self {
    self.qr_token = None;
    self
  }
}

/// Input for [`propose`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewActivity {
  pub title:                 String,
  #[serde(default)]
  pub class_id:              Option<Uuid>,
  pub start_at:              DateTime<Utc>,
  pub end_at:                DateTime<Utc>,
  pub registration_deadline: DateTime<Utc>,
  #[serde(default)]
  pub capacity:              Option<u32>,
}

impl NewActivity {
  fn validate(&self) -> Result<(), Violation> {
    if self.title.trim().is_empty() {
      return Err(Violation::InvalidActivity("title is required"));
    }
    if self.end_at <= self.start_at {
      return Err(Violation::InvalidActivity("activity must end after it starts"));
    }
    if self.registration_deadline >= self.start_at {
      return Err(Violation::InvalidActivity(
        "registration must close before the activity starts",
      ));
    }
    if self.capacity == Some(0) {
      return Err(Violation::InvalidActivity("capacity must be positive"));
    }
    Ok(())
  }
}

/// A review decision on a pending activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityReview {
  Approve,
  Reject { reason: String },
}

impl ActivityReview {
  pub fn target(&self) -> ActivityStatus {
    match self {
      Self::Approve => ActivityStatus::Approved,
      Self::Reject { .. } => ActivityStatus::Rejected,
    }
  }

  /// Apply the review to an in-memory record. The caller checks that the
  /// activity is still pending.
  pub fn apply_to(&self, activity: &mut Activity) {
    activity.status = self.target();
    activity.rejection_reason = match self {
      Self::Approve => None,
      Self::Reject { reason } => Some(reason.clone()),
    };
  }
}

// ─── Propose ─────────────────────────────────────────────────────────────────

/// Create an activity on behalf of `caller`, who becomes its creator.
///
/// Students may not create activities. A class monitor's activity is bound to
/// their own class and starts [`ActivityStatus::Pending`]; everyone else
/// publishes it as [`ActivityStatus::Approved`].
pub async fn propose<S: RosterStore>(
  store: &S,
  caller: &Caller,
  input: NewActivity,
) -> Result<Activity> {
  input.validate()?;

  let (status, class_id) = match caller.role {
    Role::Student => return Err(Error::forbidden("students cannot create activities")),
    Role::Admin | Role::Teacher => (ActivityStatus::Approved, input.class_id),
    Role::ClassMonitor => {
      let own = store
        .find_student_by_user(caller.id)
        .await
        .map_err(Error::store)?
        .and_then(|s| s.class_id)
        .ok_or_else(|| Error::forbidden("class monitor does not belong to a class"))?;
      if input.class_id.is_some_and(|id| id != own) {
        return Err(Error::forbidden("class monitors propose activities for their own class"));
      }
      (ActivityStatus::Pending, Some(own))
    }
  };

  if let Some(class_id) = class_id {
    store
      .find_class(class_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(Entity::Class, class_id))?;
  }

  let activity = Activity {
    activity_id: Uuid::new_v4(),
    title: input.title.trim().to_owned(),
    creator_user_id: caller.id,
    class_id,
    status,
    start_at: input.start_at,
    end_at: input.end_at,
    registration_deadline: input.registration_deadline,
    capacity: input.capacity,
    qr_token: None,
    rejection_reason: None,
  };
  let activity = store.insert_activity(activity).await.map_err(Error::store)?;

  tracing::info!(
    activity = %activity.activity_id,
    creator = %caller.id,
    status = %activity.status,
    "activity created"
  );
  Ok(activity)
}

// ─── Review ──────────────────────────────────────────────────────────────────

pub async fn approve_activity<S: RosterStore>(
  store: &S,
  activity_id: Uuid,
  caller: &Caller,
) -> Result<Activity> {
  review(store, activity_id, caller, ActivityReview::Approve).await
}

/// Reject a pending activity. A blank reason falls back to the default.
pub async fn reject_activity<S: RosterStore>(
  store: &S,
  activity_id: Uuid,
  reason: Option<String>,
  caller: &Caller,
) -> Result<Activity> {
  let decision = ActivityReview::Reject { reason: rejection_reason(reason) };
  review(store, activity_id, caller, decision).await
}

async fn review<S: RosterStore>(
  store: &S,
  activity_id: Uuid,
  caller: &Caller,
  decision: ActivityReview,
) -> Result<Activity> {
  let activity = find(store, activity_id).await?;

  let class = match activity.class_id {
    Some(class_id) if caller.role == Role::Teacher => {
      store.find_class(class_id).await.map_err(Error::store)?
    }
    _ => None,
  };
  if !can_review_activity(caller, class.as_ref()) {
    return Err(Error::forbidden("no authority to review this activity"));
  }

  if activity.status != ActivityStatus::Pending {
    return Err(Violation::ActivityAlreadyReviewed(activity.status).into());
  }

  match store
    .review_activity_if_pending(activity_id, &decision)
    .await
    .map_err(Error::store)?
  {
    Some(updated) => {
      tracing::info!(
        activity = %activity_id,
        by = %caller.id,
        status = %updated.status,
        "activity reviewed"
      );
      Ok(updated)
    }
    // Another reviewer got there first.
    None => {
      let current = find(store, activity_id).await?;
      Err(Violation::ActivityAlreadyReviewed(current.status).into())
    }
  }
}

async fn find<S: RosterStore>(store: &S, activity_id: Uuid) -> Result<Activity> {
  store
    .find_activity(activity_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound(Entity::Activity, activity_id))
}
