//! Registration records and their status transitions.
//!
//! ```text
//! Pending ──approve──▶ Approved ──check-in──▶ Attended
//!    │  ╲                 │
//!    │   ╲──reject──▶ Rejected ◀──reject──┘
//!    │                   │
//!    └──cancel──▶ (deleted) ◀──cancel──┘
//! ```
//!
//! Every transition is applied by the store as a conditional update on the
//! current status, never as read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationStatus {
  Pending,
  Approved,
  Rejected,
  Attended,
}

impl RegistrationStatus {
  /// Statuses that occupy a seat for capacity purposes.
  pub const SEAT_HOLDING: &'static [Self] = &[Self::Pending, Self::Approved];

  /// Statuses the owner may still withdraw from. Deleting the row frees the
  /// `(student_id, activity_id)` pair for a fresh registration.
  pub const CANCELLABLE: &'static [Self] = &[Self::Pending, Self::Rejected];

  pub fn is_cancellable(self) -> bool { Self::CANCELLABLE.contains(&self) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
  pub registration_id:  Uuid,
  pub student_id:       Uuid,
  pub activity_id:      Uuid,
  pub status:           RegistrationStatus,
  pub created_at:       DateTime<Utc>,
  pub approved_at:      Option<DateTime<Utc>>,
  pub approver_id:      Option<Uuid>,
  pub rejection_reason: Option<String>,
}

/// Input for [`crate::store::RosterStore::create_registration`]. Always lands
/// as [`RegistrationStatus::Pending`].
#[derive(Debug, Clone)]
pub struct NewRegistration {
  pub student_id:  Uuid,
  pub activity_id: Uuid,
  pub created_at:  DateTime<Utc>,
  /// Seat limit enforced atomically with the insert.
  pub capacity:    Option<u32>,
}

/// Outcome of the atomic conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationInsert {
  Created(Registration),
  /// The `(student_id, activity_id)` pair already exists.
  Duplicate,
  /// Seat-holding registrations already reached the capacity.
  Full,
}

/// A status change, together with the metadata it stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  Approve {
    approver_id: Uuid,
    at:          DateTime<Utc>,
  },
  Reject {
    approver_id: Uuid,
    at:          DateTime<Utc>,
    reason:      String,
  },
  Attend,
}

impl Transition {
  pub fn target(&self) -> RegistrationStatus {
    match self {
      Self::Approve { .. } => RegistrationStatus::Approved,
      Self::Reject { .. } => RegistrationStatus::Rejected,
      Self::Attend => RegistrationStatus::Attended,
    }
  }

  /// Statuses from which this transition is legal.
  pub fn eligible_from(&self) -> &'static [RegistrationStatus] {
    use RegistrationStatus::*;
    match self {
      Self::Approve { .. } => &[Pending],
      Self::Reject { .. } => &[Pending, Approved],
      Self::Attend => &[Approved],
    }
  }

  pub fn allows(&self, from: RegistrationStatus) -> bool {
    self.eligible_from().contains(&from)
  }

  /// Apply the transition to an in-memory record. The caller is responsible
  /// for checking [`Transition::allows`] first.
  pub fn apply_to(&self, reg: &mut Registration) {
    reg.status = self.target();
    match self {
      Self::Approve { approver_id, at } => {
        reg.approver_id = Some(*approver_id);
        reg.approved_at = Some(*at);
        reg.rejection_reason = None;
      }
      Self::Reject { approver_id, at, reason } => {
        reg.approver_id = Some(*approver_id);
        reg.approved_at = Some(*at);
        reg.rejection_reason = Some(reason.clone());
      }
      Self::Attend => {}
    }
  }
}
