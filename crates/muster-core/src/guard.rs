//! Single-item authorization for mutations.
//!
//! This is independent of [`crate::scope`]: a scope predicate may reference
//! join keys the target table lacks, so item checks look at ownership and
//! role directly. Three authority predicates live here and are kept separate
//! because their role/ownership matrices differ:
//!
//! | Predicate | Admin | Teacher | ClassMonitor | Student |
//! |-----------|-------|---------|--------------|---------|
//! | [`can_access`] (activities) | yes | yes | yes | creator only |
//! | [`can_access`] (registrations) | yes | yes | yes | owner only |
//! | [`can_approve_registration`] | yes | activity creator | registrant's class | no |
//! | [`can_manage_activity`] | yes | activity creator | no | no |
//! | [`can_review_activity`] | yes | homeroom of the activity's class | no | no |

use uuid::Uuid;

use crate::{
  Entity, Error, Result,
  activity::Activity,
  directory::{Class, Student},
  registration::Registration,
  role::{Caller, Role},
  scope::Resource,
  store::RosterStore,
};

enum Access {
  Missing,
  Denied,
  Granted,
}

/// Whether `caller` may mutate item `item_id` of `resource`.
///
/// Fails closed: a missing item or a storage error is `false`.
pub async fn can_access<S: RosterStore>(
  store: &S,
  resource: Resource,
  item_id: Uuid,
  caller: &Caller,
) -> bool {
  if caller.role.is_admin() {
    return true;
  }
  match check(store, resource, item_id, caller).await {
    Ok(access) => matches!(access, Access::Granted),
    Err(error) => {
      tracing::warn!(%resource, %item_id, caller = %caller.id, %error, "access check failed; denying");
      false
    }
  }
}

/// Like [`can_access`], but distinguishes a missing item
/// ([`Error::NotFound`]) from a refusal ([`Error::Forbidden`]).
pub async fn ensure_access<S: RosterStore>(
  store: &S,
  resource: Resource,
  item_id: Uuid,
  caller: &Caller,
) -> Result<()> {
  match check(store, resource, item_id, caller).await.map_err(Error::store)? {
    Access::Granted => Ok(()),
    Access::Denied => Err(Error::forbidden(format!("no access to this {}", entity_of(resource)))),
    Access::Missing => Err(Error::NotFound(entity_of(resource), item_id)),
  }
}

fn entity_of(resource: Resource) -> Entity {
  match resource {
    Resource::Activities => Entity::Activity,
    Resource::Registrations => Entity::Registration,
    Resource::Students => Entity::Student,
    Resource::Classes => Entity::Class,
  }
}

async fn check<S: RosterStore>(
  store: &S,
  resource: Resource,
  item_id: Uuid,
  caller: &Caller,
) -> Result<Access, S::Error> {
  let admin = caller.role.is_admin();
  let elevated = caller.role.is_elevated();

  let access = match resource {
    Resource::Activities => match store.find_activity(item_id).await? {
      None => Access::Missing,
      Some(a) if admin || elevated || a.creator_user_id == caller.id => Access::Granted,
      Some(_) => Access::Denied,
    },
    Resource::Registrations => match store.find_registration(item_id).await? {
      None => Access::Missing,
      Some(_) if admin || elevated => Access::Granted,
      Some(reg) => {
        let owner = store.find_student(reg.student_id).await?;
        if owner.is_some_and(|s| s.user_id == caller.id) {
          Access::Granted
        } else {
          Access::Denied
        }
      }
    },
    Resource::Students => match store.find_student(item_id).await? {
      None => Access::Missing,
      Some(_) if admin => Access::Granted,
      Some(_) => Access::Denied,
    },
    Resource::Classes => match store.find_class(item_id).await? {
      None => Access::Missing,
      Some(_) if admin => Access::Granted,
      Some(_) => Access::Denied,
    },
  };
  Ok(access)
}

// ─── Authority predicates ────────────────────────────────────────────────────

/// Whether `caller` may approve or reject a registration.
///
/// - `registrant`: the student the registration belongs to.
/// - `activity`: the activity registered for, if it still exists.
/// - `caller_student`: the caller's own student record (class monitors).
pub fn can_approve_registration(
  caller: &Caller,
  registrant: &Student,
  activity: Option<&Activity>,
  caller_student: Option<&Student>,
) -> bool {
  match caller.role {
    Role::Admin => true,
    Role::Teacher => activity.is_some_and(|a| a.creator_user_id == caller.id),
    Role::ClassMonitor => caller_student.is_some_and(|me| me.is_classmate_of(registrant)),
    Role::Student => false,
  }
}

/// Whether `caller` may manage an activity (issue manual check-ins).
pub fn can_manage_activity(caller: &Caller, activity: &Activity) -> bool {
  match caller.role {
    Role::Admin => true,
    Role::Teacher => activity.creator_user_id == caller.id,
    Role::ClassMonitor | Role::Student => false,
  }
}

/// Whether `caller` may approve or reject a pending activity. `class` is the
/// activity's class; institution-wide activities are reviewed by Admins only.
pub fn can_review_activity(caller: &Caller, class: Option<&Class>) -> bool {
  match caller.role {
    Role::Admin => true,
    Role::Teacher => class.is_some_and(|c| c.homeroom_teacher_id == Some(caller.id)),
    Role::ClassMonitor | Role::Student => false,
  }
}

/// Load everything [`can_approve_registration`] needs for `registration` and
/// evaluate it against current class membership.
pub(crate) async fn approval_authority<S: RosterStore>(
  store: &S,
  registration: &Registration,
  caller: &Caller,
) -> Result<bool> {
  if caller.role.is_admin() {
    return Ok(true);
  }
  if caller.role == Role::Student {
    return Ok(false);
  }

  let Some(registrant) = store
    .find_student(registration.student_id)
    .await
    .map_err(Error::store)?
  else {
    return Ok(false);
  };

  let activity = match caller.role {
    Role::Teacher => store
      .find_activity(registration.activity_id)
      .await
      .map_err(Error::store)?,
    _ => None,
  };
  let caller_student = match caller.role {
    Role::ClassMonitor => store
      .find_student_by_user(caller.id)
      .await
      .map_err(Error::store)?,
    _ => None,
  };

  Ok(can_approve_registration(
    caller,
    &registrant,
    activity.as_ref(),
    caller_student.as_ref(),
  ))
}
