//! Error types for `muster-core`.
//!
//! Each variant maps onto exactly one transport status.

use thiserror::Error;
use uuid::Uuid;

use crate::{activity::ActivityStatus, registration::RegistrationStatus};

/// The kind of entity a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Entity {
  Activity,
  Registration,
  Student,
  Class,
}

/// A business-rule violation. Always surfaced as [`Error::Validation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("activity not found")]
  ActivityNotFound,

  #[error("activity is not open for registration")]
  ActivityNotApproved,

  #[error("{0}")]
  InvalidActivity(&'static str),

  #[error("activity is already {0}")]
  ActivityAlreadyReviewed(ActivityStatus),

  #[error("registration deadline has passed")]
  DeadlinePassed,

  #[error("activity has reached its capacity")]
  CapacityReached,

  #[error("student is already registered for this activity")]
  AlreadyRegistered,

  #[error("registration is already approved")]
  AlreadyApproved,

  #[error("cannot move a {from} registration to {to}")]
  InvalidTransition {
    from: RegistrationStatus,
    to:   RegistrationStatus,
  },

  #[error("registration is {0} and can no longer be cancelled")]
  NotCancellable(RegistrationStatus),

  #[error("no QR code has been issued for this activity")]
  NoQrIssued,

  #[error("QR token does not match")]
  TokenMismatch,

  #[error("activity has not started yet")]
  NotStarted,

  #[error("activity has already ended")]
  AlreadyEnded,

  #[error("student is not registered for this activity")]
  NotRegistered,

  #[error("registration is {0}, not approved")]
  NotApproved(RegistrationStatus),

  #[error("no registration ids supplied")]
  EmptyBatch,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} not found: {1}")]
  NotFound(Entity, Uuid),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("{0}")]
  Validation(#[from] Violation),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
    Self::Forbidden(msg.into())
  }

  /// The violation carried by a validation error, if any.
  pub fn violation(&self) -> Option<&Violation> {
    match self {
      Self::Validation(v) => Some(v),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
