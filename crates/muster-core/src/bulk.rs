//! Approve or reject many registrations at once, all-or-nothing with respect
//! to authorization.
//!
//! Phase one loads every registration and evaluates the same authority
//! predicate as a single approve/reject; any missing row or refusal aborts
//! the call before anything is written. Phase two hands the whole batch to
//! the store as one atomic statement.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result, Violation,
  guard::approval_authority,
  lifecycle::{self, rejection_reason},
  registration::Transition,
  role::Caller,
  store::RosterStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalAction {
  Approve,
  Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
  /// Rows actually transitioned. Rows already in an ineligible status are
  /// skipped and not counted.
  pub updated_count: u64,
}

pub async fn bulk_apply_approval_action<S: RosterStore>(
  store: &S,
  ids: &[Uuid],
  action: ApprovalAction,
  reason: Option<String>,
  caller: &Caller,
  now: DateTime<Utc>,
) -> Result<BulkOutcome> {
  let ids: Vec<Uuid> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
  if ids.is_empty() {
    return Err(Violation::EmptyBatch.into());
  }

  for id in &ids {
    let reg = lifecycle::load(store, *id).await?;
    if !approval_authority(store, &reg, caller).await? {
      tracing::info!(registration = %id, caller = %caller.id, %action, "bulk action refused");
      return Err(Error::forbidden(format!("no authority over registration {id}")));
    }
  }

  let transition = match action {
    ApprovalAction::Approve => Transition::Approve { approver_id: caller.id, at: now },
    ApprovalAction::Reject => Transition::Reject {
      approver_id: caller.id,
      at:          now,
      reason:      rejection_reason(reason),
    },
  };

  let updated_count = store
    .bulk_update_registration_status(&ids, &transition)
    .await
    .map_err(Error::store)?;

  tracing::info!(
    requested = ids.len(),
    updated = updated_count,
    %action,
    caller = %caller.id,
    "bulk approval action applied"
  );
  Ok(BulkOutcome { updated_count })
}
