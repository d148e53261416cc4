//! Row-level visibility: which records of a resource a caller may see.
//!
//! [`resolve`] turns `(resource, caller)` into a declarative [`Scope`] that a
//! storage adapter compiles into its native query language. Resolution is
//! fail-closed: only an Admin ever receives [`Scope::AllowAll`], and any
//! lookup failure, missing class membership or unparseable resource name
//! yields [`Scope::DenyAll`].

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  activity::Activity,
  directory::{Class, Student},
  registration::Registration,
  role::{Caller, Role},
  store::RosterStore,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// A listable resource.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resource {
  Activities,
  Registrations,
  Students,
  Classes,
}

/// A filter over one resource's rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
  /// Activities whose creator is one of these users.
  CreatorIn(BTreeSet<Uuid>),
  /// Registrations whose student belongs to one of these classes.
  StudentClassIn(BTreeSet<Uuid>),
  /// Registrations owned by this student.
  StudentIs(Uuid),
  /// Students enrolled in one of these classes.
  ClassIn(BTreeSet<Uuid>),
  /// Rows whose primary key is one of these ids.
  IdIn(BTreeSet<Uuid>),
}

impl Predicate {
  /// Whether this predicate can be evaluated against `resource`. Adapters
  /// compile a predicate that does not describe the listed resource to a
  /// condition that matches nothing.
  pub fn describes(&self, resource: Resource) -> bool {
    match self {
      Self::CreatorIn(_) => resource == Resource::Activities,
      Self::StudentClassIn(_) | Self::StudentIs(_) => {
        resource == Resource::Registrations
      }
      Self::ClassIn(_) => resource == Resource::Students,
      Self::IdIn(_) => true,
    }
  }
}

/// The visibility granted to a caller over one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "predicate", rename_all = "snake_case")]
pub enum Scope {
  AllowAll,
  /// Matches no row. Adapters must compile this to a native false condition.
  DenyAll,
  Filter(Predicate),
}

impl Scope {
  pub fn is_deny_all(&self) -> bool { matches!(self, Self::DenyAll) }

  fn only(id: Uuid) -> Self { Self::Filter(Predicate::IdIn(BTreeSet::from([id]))) }

  // ── In-process evaluation ─────────────────────────────────────────────
  //
  // Reference semantics for adapters that cannot push the filter down.

  pub fn admits_activity(&self, activity: &Activity) -> bool {
    self.admits(Resource::Activities, |p| match p {
      Predicate::CreatorIn(ids) => ids.contains(&activity.creator_user_id),
      Predicate::IdIn(ids) => ids.contains(&activity.activity_id),
      _ => false,
    })
  }

  /// `registrant` is the registration's student, if it could be loaded.
  pub fn admits_registration(
    &self,
    registration: &Registration,
    registrant: Option<&Student>,
  ) -> bool {
    self.admits(Resource::Registrations, |p| match p {
      Predicate::StudentClassIn(ids) => registrant
        .and_then(|s| s.class_id)
        .is_some_and(|c| ids.contains(&c)),
      Predicate::StudentIs(id) => registration.student_id == *id,
      Predicate::IdIn(ids) => ids.contains(&registration.registration_id),
      _ => false,
    })
  }

  pub fn admits_student(&self, student: &Student) -> bool {
    self.admits(Resource::Students, |p| match p {
      Predicate::ClassIn(ids) => student.class_id.is_some_and(|c| ids.contains(&c)),
      Predicate::IdIn(ids) => ids.contains(&student.student_id),
      _ => false,
    })
  }

  pub fn admits_class(&self, class: &Class) -> bool {
    self.admits(Resource::Classes, |p| match p {
      Predicate::IdIn(ids) => ids.contains(&class.class_id),
      _ => false,
    })
  }

  fn admits(&self, resource: Resource, eval: impl FnOnce(&Predicate) -> bool) -> bool {
    match self {
      Self::AllowAll => true,
      Self::DenyAll => false,
      Self::Filter(p) => p.describes(resource) && eval(p),
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Compute the rows of `resource` that `caller` may see.
///
/// Never fails: a storage error degrades to [`Scope::DenyAll`] so a listing
/// returns an empty page rather than an error.
pub async fn resolve<S: RosterStore>(store: &S, resource: Resource, caller: &Caller) -> Scope {
  let result = match caller.role {
    Role::Admin => Ok(Scope::AllowAll),
    Role::Teacher => teacher_scope(store, resource, caller.id).await,
    Role::ClassMonitor | Role::Student => {
      class_member_scope(store, resource, caller.id).await
    }
  };
  fail_closed(result, resource, caller)
}

/// [`resolve`] for a resource given by name. Unknown names deny all.
pub async fn resolve_named<S: RosterStore>(store: &S, name: &str, caller: &Caller) -> Scope {
  match name.parse::<Resource>() {
    Ok(resource) => resolve(store, resource, caller).await,
    Err(_) => {
      tracing::warn!(resource = name, caller = %caller.id, "unknown resource; denying all");
      Scope::DenyAll
    }
  }
}

/// Compute the rows of `resource` the caller *owns*: activities they created,
/// their own registrations, their own student record and class.
pub async fn resolve_own<S: RosterStore>(store: &S, resource: Resource, caller: &Caller) -> Scope {
  if caller.role.is_admin() {
    return Scope::AllowAll;
  }

  let student = match resource {
    Resource::Activities => Ok(None),
    _ => store.find_student_by_user(caller.id).await,
  };
  let result = student.map(|student| own_scope(resource, caller.id, student));
  fail_closed(result, resource, caller)
}

fn own_scope(resource: Resource, user_id: Uuid, student: Option<Student>) -> Scope {
  match (resource, student) {
    (Resource::Activities, _) => Scope::Filter(Predicate::CreatorIn(BTreeSet::from([user_id]))),
    (_, None) => Scope::DenyAll,
    (Resource::Registrations, Some(s)) => Scope::Filter(Predicate::StudentIs(s.student_id)),
    (Resource::Students, Some(s)) => Scope::only(s.student_id),
    (Resource::Classes, Some(s)) => s.class_id.map_or(Scope::DenyAll, Scope::only),
  }
}

fn fail_closed<E: std::error::Error>(
  result: Result<Scope, E>,
  resource: Resource,
  caller: &Caller,
) -> Scope {
  match result {
    Ok(scope) => {
      tracing::debug!(%resource, caller = %caller.id, role = %caller.role, ?scope, "scope resolved");
      scope
    }
    Err(error) => {
      tracing::warn!(
        %resource,
        caller = %caller.id,
        role = %caller.role,
        %error,
        "scope resolution failed; denying all"
      );
      Scope::DenyAll
    }
  }
}

/// Teachers see their homeroom classes and everything hanging off them.
async fn teacher_scope<S: RosterStore>(
  store: &S,
  resource: Resource,
  teacher_id: Uuid,
) -> Result<Scope, S::Error> {
  let class_ids: BTreeSet<Uuid> = store
    .find_classes_by_homeroom_teacher(teacher_id)
    .await?
    .into_iter()
    .map(|c| c.class_id)
    .collect();

  if class_ids.is_empty() {
    return Ok(Scope::DenyAll);
  }

  let predicate = match resource {
    Resource::Activities => {
      let mut creators = BTreeSet::from([teacher_id]);
      for class_id in &class_ids {
        creators.extend(
          store
            .find_students_by_class(*class_id)
            .await?
            .into_iter()
            .map(|s| s.user_id),
        );
      }
      Predicate::CreatorIn(creators)
    }
    Resource::Registrations => Predicate::StudentClassIn(class_ids),
    Resource::Students => Predicate::ClassIn(class_ids),
    Resource::Classes => Predicate::IdIn(class_ids),
  };
  Ok(Scope::Filter(predicate))
}

/// Students and class monitors see their own class only.
async fn class_member_scope<S: RosterStore>(
  store: &S,
  resource: Resource,
  user_id: Uuid,
) -> Result<Scope, S::Error> {
  let Some(class_id) = store
    .find_student_by_user(user_id)
    .await?
    .and_then(|s| s.class_id)
  else {
    return Ok(Scope::DenyAll);
  };

  let predicate = match resource {
    Resource::Activities => {
      let Some(class) = store.find_class(class_id).await? else {
        tracing::warn!(%class_id, %user_id, "student references a missing class");
        return Ok(Scope::DenyAll);
      };
      let mut creators: BTreeSet<Uuid> = store
        .find_students_by_class(class_id)
        .await?
        .into_iter()
        .map(|s| s.user_id)
        .collect();
      creators.insert(user_id);
      creators.extend(class.homeroom_teacher_id);
      Predicate::CreatorIn(creators)
    }
    Resource::Registrations => Predicate::StudentClassIn(BTreeSet::from([class_id])),
    Resource::Students => Predicate::ClassIn(BTreeSet::from([class_id])),
    Resource::Classes => Predicate::IdIn(BTreeSet::from([class_id])),
  };
  Ok(Scope::Filter(predicate))
}
