//! Workflow and scoping tests against [`MemoryStore`].

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{
  Entity, Error, Violation,
  activity::{self as activities, Activity, ActivityReview, ActivityStatus, NewActivity},
  attendance::{self, Attendance, CheckInMethod, NewAttendance},
  bulk::{ApprovalAction, bulk_apply_approval_action},
  directory::{Class, Student},
  guard::{can_access, ensure_access},
  lifecycle::{self, DEFAULT_REJECTION_REASON},
  memory::{MemoryError, MemoryStore},
  qr,
  registration::{
    NewRegistration, Registration, RegistrationInsert, RegistrationStatus, Transition,
  },
  role::{Caller, Role},
  scope::{self, Predicate, Resource, Scope},
  store::RosterStore,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 5, 10, h, m, s).unwrap()
}

/// Well before every activity's registration deadline.
fn morning() -> DateTime<Utc> { at(8, 0, 0) }

async fn class(store: &MemoryStore, teacher: Option<Uuid>) -> Class {
  store
    .insert_class(Class {
      class_id:            Uuid::new_v4(),
      name:                "CNTT-K20".into(),
      homeroom_teacher_id: teacher,
    })
    .await
    .unwrap()
}

async fn member(store: &MemoryStore, role: Role, class_id: Option<Uuid>) -> (Caller, Student) {
  let caller = Caller::new(Uuid::new_v4(), role);
  let student = store
    .insert_student(Student { student_id: Uuid::new_v4(), user_id: caller.id, class_id })
    .await
    .unwrap();
  (caller, student)
}

/// An approved activity running 10:00:00–12:00:00, registration closing at
/// 09:00:00.
async fn activity(store: &MemoryStore, creator: Uuid) -> Activity {
  store
    .insert_activity(Activity {
      activity_id:           Uuid::new_v4(),
      title:                 "Green Sunday".into(),
      creator_user_id:       creator,
      class_id:              None,
      status:                ActivityStatus::Approved,
      start_at:              at(10, 0, 0),
      end_at:                at(12, 0, 0),
      registration_deadline: at(9, 0, 0),
      capacity:              None,
      qr_token:              None,
      rejection_reason:      None,
    })
    .await
    .unwrap()
}

/// Teacher `t` is homeroom of class `c1`, with a monitor and two students.
struct Campus {
  store:    MemoryStore,
  class_id: Uuid,
  admin:    Caller,
  teacher:  Caller,
  monitor:  (Caller, Student),
  alice:    (Caller, Student),
  bob:      (Caller, Student),
}

async fn campus() -> Campus {
  let store = MemoryStore::new();
  let teacher = Caller::new(Uuid::new_v4(), Role::Teacher);
  let c1 = class(&store, Some(teacher.id)).await;
  let monitor = member(&store, Role::ClassMonitor, Some(c1.class_id)).await;
  let alice = member(&store, Role::Student, Some(c1.class_id)).await;
  let bob = member(&store, Role::Student, Some(c1.class_id)).await;
  Campus {
    store,
    class_id: c1.class_id,
    admin: Caller::new(Uuid::new_v4(), Role::Admin),
    teacher,
    monitor,
    alice,
    bob,
  }
}

fn violation(err: Error) -> Violation {
  match err {
    Error::Validation(v) => v,
    other => panic!("expected a validation error, got {other:?}"),
  }
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_user_has_at_most_one_student_record() {
  let c = campus().await;
  let twin = Student { student_id: Uuid::new_v4(), user_id: c.alice.0.id, class_id: None };
  let err = c.store.insert_student(twin.clone()).await.unwrap_err();
  assert!(matches!(err, MemoryError::DuplicateUser(id) if id == c.alice.0.id));
  assert!(c.store.find_student(twin.student_id).await.unwrap().is_none());

  // Saving the same record again is an update.
  let moved = Student { class_id: None, ..c.alice.1.clone() };
  c.store.insert_student(moved.clone()).await.unwrap();
  assert_eq!(c.store.find_student_by_user(c.alice.0.id).await.unwrap(), Some(moved));
}

// ─── Scope resolution ────────────────────────────────────────────────────────

#[tokio::test]
async fn non_admins_never_see_everything() {
  let c = campus().await;
  let lonely_teacher = Caller::new(Uuid::new_v4(), Role::Teacher);
  let (orphan, _) = member(&c.store, Role::Student, None).await;
  let callers = [c.teacher, lonely_teacher, c.monitor.0, c.alice.0, orphan];

  for caller in &callers {
    for resource in Resource::iter() {
      let scope = scope::resolve(&c.store, resource, caller).await;
      assert_ne!(scope, Scope::AllowAll, "{resource} for {:?}", caller.role);
    }
  }
}

#[tokio::test]
async fn admin_sees_everything() {
  let c = campus().await;
  for resource in Resource::iter() {
    assert_eq!(scope::resolve(&c.store, resource, &c.admin).await, Scope::AllowAll);
  }
}

#[tokio::test]
async fn classless_students_and_monitors_are_denied_everything() {
  let store = MemoryStore::new();
  let (student, _) = member(&store, Role::Student, None).await;
  let (monitor, _) = member(&store, Role::ClassMonitor, None).await;
  let stranger = Caller::new(Uuid::new_v4(), Role::Student);

  for caller in [student, monitor, stranger] {
    for resource in Resource::iter() {
      assert!(scope::resolve(&store, resource, &caller).await.is_deny_all());
    }
  }
}

#[tokio::test]
async fn teacher_without_homeroom_is_denied_everything() {
  let store = MemoryStore::new();
  class(&store, Some(Uuid::new_v4())).await;
  let teacher = Caller::new(Uuid::new_v4(), Role::Teacher);

  for resource in Resource::iter() {
    assert!(scope::resolve(&store, resource, &teacher).await.is_deny_all());
  }
}

#[tokio::test]
async fn teacher_registrations_are_scoped_to_homeroom_students() {
  let c = campus().await;
  let scope = scope::resolve(&c.store, Resource::Registrations, &c.teacher).await;
  assert_eq!(scope, Scope::Filter(Predicate::StudentClassIn(BTreeSet::from([c.class_id]))));

  // A registration from another class stays invisible.
  let other = class(&c.store, None).await;
  let (_, outsider) = member(&c.store, Role::Student, Some(other.class_id)).await;
  let act = activity(&c.store, c.teacher.id).await;
  let mine = lifecycle::create(&c.store, c.alice.1.student_id, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::create(&c.store, outsider.student_id, act.activity_id, morning())
    .await
    .unwrap();

  let listed = c.store.list_registrations(&scope).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].registration_id, mine.registration_id);
}

#[tokio::test]
async fn teacher_sees_activities_of_self_and_homeroom_students() {
  let c = campus().await;
  let scope = scope::resolve(&c.store, Resource::Activities, &c.teacher).await;
  let Scope::Filter(Predicate::CreatorIn(creators)) = &scope else {
    panic!("unexpected scope {scope:?}");
  };
  assert!(creators.contains(&c.teacher.id));
  assert!(creators.contains(&c.alice.0.id));
  assert!(creators.contains(&c.monitor.0.id));

  activity(&c.store, c.alice.0.id).await;
  activity(&c.store, c.teacher.id).await;
  activity(&c.store, Uuid::new_v4()).await;
  assert_eq!(c.store.list_activities(&scope).await.unwrap().len(), 2);
}

#[tokio::test]
async fn students_see_classmates_and_homeroom_teacher_activities() {
  let c = campus().await;
  activity(&c.store, c.teacher.id).await;
  activity(&c.store, c.bob.0.id).await;
  activity(&c.store, Uuid::new_v4()).await;

  let scope = scope::resolve(&c.store, Resource::Activities, &c.alice.0).await;
  assert_eq!(c.store.list_activities(&scope).await.unwrap().len(), 2);

  let classes = scope::resolve(&c.store, Resource::Classes, &c.alice.0).await;
  assert_eq!(classes, Scope::Filter(Predicate::IdIn(BTreeSet::from([c.class_id]))));

  let students = scope::resolve(&c.store, Resource::Students, &c.alice.0).await;
  assert_eq!(c.store.list_students(&students).await.unwrap().len(), 3);
}

#[tokio::test]
async fn orphan_student_cannot_see_any_class() {
  let c = campus().await;
  let (s9, _) = member(&c.store, Role::Student, None).await;
  let scope = scope::resolve(&c.store, Resource::Classes, &s9).await;
  assert_eq!(scope, Scope::DenyAll);
  assert!(c.store.list_classes(&scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn lookup_failure_fails_closed() {
  let c = campus().await;
  c.store.set_unavailable(true);
  for resource in Resource::iter() {
    assert!(scope::resolve(&c.store, resource, &c.teacher).await.is_deny_all());
    assert!(scope::resolve(&c.store, resource, &c.alice.0).await.is_deny_all());
  }
}

#[tokio::test]
async fn unknown_resource_name_is_denied() {
  let c = campus().await;
  assert!(scope::resolve_named(&c.store, "users", &c.teacher).await.is_deny_all());
  assert!(scope::resolve_named(&c.store, "users", &c.admin).await.is_deny_all());
  assert_eq!(
    scope::resolve_named(&c.store, "classes", &c.admin).await,
    Scope::AllowAll
  );
}

#[tokio::test]
async fn ownership_scope_limits_to_own_rows() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let mine = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::register(&c.store, &c.bob.0, act.activity_id, morning())
    .await
    .unwrap();

  let own = scope::resolve_own(&c.store, Resource::Registrations, &c.alice.0).await;
  let listed = c.store.list_registrations(&own).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].registration_id, mine.registration_id);

  // A teacher has no student record: no own registrations.
  let teacher_own = scope::resolve_own(&c.store, Resource::Registrations, &c.teacher).await;
  assert!(teacher_own.is_deny_all());

  let created = scope::resolve_own(&c.store, Resource::Activities, &c.teacher).await;
  assert_eq!(c.store.list_activities(&created).await.unwrap().len(), 1);
}

// ─── Access guard ────────────────────────────────────────────────────────────

#[tokio::test]
async fn activity_access_for_creator_and_elevated_roles() {
  let c = campus().await;
  let act = activity(&c.store, c.alice.0.id).await;
  let outsider_teacher = Caller::new(Uuid::new_v4(), Role::Teacher);

  assert!(can_access(&c.store, Resource::Activities, act.activity_id, &c.alice.0).await);
  assert!(!can_access(&c.store, Resource::Activities, act.activity_id, &c.bob.0).await);
  assert!(can_access(&c.store, Resource::Activities, act.activity_id, &outsider_teacher).await);
  assert!(can_access(&c.store, Resource::Activities, act.activity_id, &c.monitor.0).await);
  assert!(can_access(&c.store, Resource::Activities, act.activity_id, &c.admin).await);
}

#[tokio::test]
async fn registration_access_for_owner_and_elevated_roles() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  let id = reg.registration_id;

  assert!(can_access(&c.store, Resource::Registrations, id, &c.alice.0).await);
  assert!(!can_access(&c.store, Resource::Registrations, id, &c.bob.0).await);
  assert!(can_access(&c.store, Resource::Registrations, id, &c.monitor.0).await);

  let err = lifecycle::get_registration(&c.store, id, &c.bob.0).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));
  assert_eq!(lifecycle::get_registration(&c.store, id, &c.alice.0).await.unwrap(), reg);
}

#[tokio::test]
async fn missing_items_are_inaccessible_and_not_found() {
  let c = campus().await;
  let missing = Uuid::new_v4();
  assert!(!can_access(&c.store, Resource::Activities, missing, &c.teacher).await);
  assert!(!can_access(&c.store, Resource::Registrations, missing, &c.alice.0).await);

  let err = ensure_access(&c.store, Resource::Activities, missing, &c.teacher)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound(..)));
}

#[tokio::test]
async fn access_check_fails_closed_on_store_error() {
  let c = campus().await;
  let act = activity(&c.store, c.alice.0.id).await;
  c.store.set_unavailable(true);
  assert!(!can_access(&c.store, Resource::Activities, act.activity_id, &c.alice.0).await);
}

#[tokio::test]
async fn students_and_classes_are_admin_only_for_mutation() {
  let c = campus().await;
  let sid = c.alice.1.student_id;
  assert!(!can_access(&c.store, Resource::Students, sid, &c.alice.0).await);
  assert!(!can_access(&c.store, Resource::Classes, c.class_id, &c.teacher).await);
  assert!(can_access(&c.store, Resource::Classes, c.class_id, &c.admin).await);
}

// ─── Registration lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn create_starts_pending() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::create(&c.store, c.alice.1.student_id, act.activity_id, morning())
    .await
    .unwrap();
  assert_eq!(reg.status, RegistrationStatus::Pending);
  assert_eq!(reg.created_at, morning());
  assert!(reg.approver_id.is_none());
}

#[tokio::test]
async fn create_twice_is_rejected() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let sid = c.alice.1.student_id;
  lifecycle::create(&c.store, sid, act.activity_id, morning()).await.unwrap();
  let err = lifecycle::create(&c.store, sid, act.activity_id, morning()).await.unwrap_err();
  assert_eq!(violation(err), Violation::AlreadyRegistered);
}

#[tokio::test]
async fn create_checks_activity_state() {
  let c = campus().await;
  let sid = c.alice.1.student_id;

  let err = lifecycle::create(&c.store, sid, Uuid::new_v4(), morning()).await.unwrap_err();
  assert_eq!(violation(err), Violation::ActivityNotFound);

  let mut pending = activity(&c.store, c.teacher.id).await;
  pending.status = ActivityStatus::Pending;
  let pending = c.store.insert_activity(pending).await.unwrap();
  let err = lifecycle::create(&c.store, sid, pending.activity_id, morning()).await.unwrap_err();
  assert_eq!(violation(err), Violation::ActivityNotApproved);

  let open = activity(&c.store, c.teacher.id).await;
  let late = open.registration_deadline + Duration::seconds(1);
  let err = lifecycle::create(&c.store, sid, open.activity_id, late).await.unwrap_err();
  assert_eq!(violation(err), Violation::DeadlinePassed);

  // Exactly at the deadline is still on time.
  lifecycle::create(&c.store, sid, open.activity_id, open.registration_deadline)
    .await
    .unwrap();
}

#[tokio::test]
async fn create_enforces_capacity_over_seat_holding_registrations() {
  let c = campus().await;
  let mut act = activity(&c.store, c.teacher.id).await;
  act.capacity = Some(1);
  let act = c.store.insert_activity(act).await.unwrap();

  let first = lifecycle::create(&c.store, c.alice.1.student_id, act.activity_id, morning())
    .await
    .unwrap();
  let err = lifecycle::create(&c.store, c.bob.1.student_id, act.activity_id, morning())
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::CapacityReached);

  // A rejection frees the seat.
  lifecycle::reject(&c.store, first.registration_id, None, &c.teacher, morning())
    .await
    .unwrap();
  lifecycle::create(&c.store, c.bob.1.student_id, act.activity_id, morning())
    .await
    .unwrap();
}

#[tokio::test]
async fn register_requires_a_student_record() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;

  let err = lifecycle::register(&c.store, &c.teacher, act.activity_id, morning())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let ghost = Caller::new(Uuid::new_v4(), Role::Student);
  let err = lifecycle::register(&c.store, &ghost, act.activity_id, morning())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let reg = lifecycle::register(&c.store, &c.monitor.0, act.activity_id, morning())
    .await
    .unwrap();
  assert_eq!(reg.student_id, c.monitor.1.student_id);
}

#[tokio::test]
async fn monitor_approves_classmate_once() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let r1 = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let approved = lifecycle::approve(&c.store, r1.registration_id, &c.monitor.0, at(8, 30, 0))
    .await
    .unwrap();
  assert_eq!(approved.status, RegistrationStatus::Approved);
  assert_eq!(approved.approver_id, Some(c.monitor.0.id));
  assert_eq!(approved.approved_at, Some(at(8, 30, 0)));

  let err = lifecycle::approve(&c.store, r1.registration_id, &c.monitor.0, at(8, 31, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::AlreadyApproved);
}

#[tokio::test]
async fn approval_authority_matrix() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  let id = reg.registration_id;

  let other_teacher = Caller::new(Uuid::new_v4(), Role::Teacher);
  let other_class = class(&c.store, None).await;
  let (other_monitor, _) = member(&c.store, Role::ClassMonitor, Some(other_class.class_id)).await;

  for caller in [other_teacher, other_monitor, c.bob.0, c.alice.0] {
    let err = lifecycle::approve(&c.store, id, &caller, morning()).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{:?} should be refused", caller.role);
  }

  let err = lifecycle::approve(&c.store, Uuid::new_v4(), &c.admin, morning()).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(..)));

  lifecycle::approve(&c.store, id, &c.teacher, morning()).await.unwrap();
}

#[tokio::test]
async fn approval_authority_follows_current_class_membership() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  // The monitor moves to another class between requests.
  let elsewhere = class(&c.store, None).await;
  let mut moved = c.monitor.1.clone();
  moved.class_id = Some(elsewhere.class_id);
  c.store.insert_student(moved).await.unwrap();

  let err = lifecycle::approve(&c.store, reg.registration_id, &c.monitor.0, morning())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn reject_stamps_reason_and_approver() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let rejected = lifecycle::reject(
    &c.store,
    reg.registration_id,
    Some("missing prerequisite".into()),
    &c.teacher,
    at(8, 45, 0),
  )
  .await
  .unwrap();
  assert_eq!(rejected.status, RegistrationStatus::Rejected);
  assert_eq!(rejected.rejection_reason.as_deref(), Some("missing prerequisite"));
  assert_eq!(rejected.approver_id, Some(c.teacher.id));
  assert_eq!(rejected.approved_at, Some(at(8, 45, 0)));

  let err = lifecycle::reject(&c.store, reg.registration_id, None, &c.teacher, morning())
    .await
    .unwrap_err();
  assert!(matches!(violation(err), Violation::InvalidTransition { .. }));
}

#[tokio::test]
async fn approved_registration_can_still_be_rejected() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::approve(&c.store, reg.registration_id, &c.teacher, morning()).await.unwrap();

  let rejected = lifecycle::reject(&c.store, reg.registration_id, None, &c.admin, morning())
    .await
    .unwrap();
  assert_eq!(rejected.rejection_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
}

#[tokio::test]
async fn cancel_after_approve_is_rejected() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::approve(&c.store, reg.registration_id, &c.teacher, morning()).await.unwrap();

  let err = lifecycle::cancel(&c.store, reg.registration_id, &c.alice.0).await.unwrap_err();
  assert_eq!(violation(err), Violation::NotCancellable(RegistrationStatus::Approved));
  assert!(c.store.find_registration(reg.registration_id).await.unwrap().is_some());
}

#[tokio::test]
async fn only_owner_or_admin_can_cancel() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let a = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  let b = lifecycle::register(&c.store, &c.bob.0, act.activity_id, morning())
    .await
    .unwrap();

  for caller in [c.bob.0, c.monitor.0, c.teacher] {
    let err = lifecycle::cancel(&c.store, a.registration_id, &caller).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
  }

  lifecycle::cancel(&c.store, a.registration_id, &c.alice.0).await.unwrap();
  lifecycle::cancel(&c.store, b.registration_id, &c.admin).await.unwrap();
  assert!(c.store.find_registration(a.registration_id).await.unwrap().is_none());
  assert!(c.store.find_registration(b.registration_id).await.unwrap().is_none());

  let err = lifecycle::cancel(&c.store, a.registration_id, &c.alice.0).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(..)));
}

#[tokio::test]
async fn rejected_registration_can_be_withdrawn_and_renewed() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::reject(&c.store, reg.registration_id, None, &c.teacher, morning())
    .await
    .unwrap();

  lifecycle::cancel(&c.store, reg.registration_id, &c.alice.0).await.unwrap();
  assert!(c.store.find_registration(reg.registration_id).await.unwrap().is_none());

  let again = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  assert_eq!(again.status, RegistrationStatus::Pending);
  assert_ne!(again.registration_id, reg.registration_id);
}

/// Delegates to a [`MemoryStore`], but approves the registration right before
/// the conditional delete runs, as a concurrent approver would.
struct ApprovedMidCancel {
  inner:    MemoryStore,
  approver: Uuid,
}

impl RosterStore for ApprovedMidCancel {
  type Error = MemoryError;

  async fn find_class(&self, id: Uuid) -> Result<Option<Class>, MemoryError> {
    self.inner.find_class(id).await
  }

  async fn find_classes_by_homeroom_teacher(&self, id: Uuid) -> Result<Vec<Class>, MemoryError> {
    self.inner.find_classes_by_homeroom_teacher(id).await
  }

  async fn find_student(&self, id: Uuid) -> Result<Option<Student>, MemoryError> {
    self.inner.find_student(id).await
  }

  async fn find_student_by_user(&self, id: Uuid) -> Result<Option<Student>, MemoryError> {
    self.inner.find_student_by_user(id).await
  }

  async fn find_students_by_class(&self, id: Uuid) -> Result<Vec<Student>, MemoryError> {
    self.inner.find_students_by_class(id).await
  }

  async fn insert_class(&self, class: Class) -> Result<Class, MemoryError> {
    self.inner.insert_class(class).await
  }

  async fn insert_student(&self, student: Student) -> Result<Student, MemoryError> {
    self.inner.insert_student(student).await
  }

  async fn find_activity(&self, id: Uuid) -> Result<Option<Activity>, MemoryError> {
    self.inner.find_activity(id).await
  }

  async fn insert_activity(&self, activity: Activity) -> Result<Activity, MemoryError> {
    self.inner.insert_activity(activity).await
  }

  async fn set_qr_token_if_absent(
    &self,
    id: Uuid,
    token: String,
  ) -> Result<Option<String>, MemoryError> {
    self.inner.set_qr_token_if_absent(id, token).await
  }

  async fn review_activity_if_pending<'a>(
    &'a self,
    id: Uuid,
    review: &'a ActivityReview,
  ) -> Result<Option<Activity>, MemoryError> {
    self.inner.review_activity_if_pending(id, review).await
  }

  async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, MemoryError> {
    self.inner.find_registration(id).await
  }

  async fn find_registration_by_student_and_activity(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Registration>, MemoryError> {
    self
      .inner
      .find_registration_by_student_and_activity(student_id, activity_id)
      .await
  }

  async fn create_registration(
    &self,
    input: NewRegistration,
  ) -> Result<RegistrationInsert, MemoryError> {
    self.inner.create_registration(input).await
  }

  async fn update_registration_status<'a>(
    &'a self,
    id: Uuid,
    transition: &'a Transition,
  ) -> Result<Option<Registration>, MemoryError> {
    self.inner.update_registration_status(id, transition).await
  }

  async fn bulk_update_registration_status<'a>(
    &'a self,
    ids: &'a [Uuid],
    transition: &'a Transition,
  ) -> Result<u64, MemoryError> {
    self.inner.bulk_update_registration_status(ids, transition).await
  }

  async fn delete_registration_if_cancellable(&self, id: Uuid) -> Result<bool, MemoryError> {
    let approve = Transition::Approve { approver_id: self.approver, at: morning() };
    self.inner.update_registration_status(id, &approve).await?;
    self.inner.delete_registration_if_cancellable(id).await
  }

  async fn find_attendance(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Attendance>, MemoryError> {
    self.inner.find_attendance(student_id, activity_id).await
  }

  async fn insert_attendance_if_absent(
    &self,
    input: NewAttendance,
  ) -> Result<Option<Attendance>, MemoryError> {
    self.inner.insert_attendance_if_absent(input).await
  }

  async fn list_activities<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Activity>, MemoryError> {
    self.inner.list_activities(scope).await
  }

  async fn list_registrations<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> Result<Vec<Registration>, MemoryError> {
    self.inner.list_registrations(scope).await
  }

  async fn list_students<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Student>, MemoryError> {
    self.inner.list_students(scope).await
  }

  async fn list_classes<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Class>, MemoryError> {
    self.inner.list_classes(scope).await
  }
}

#[tokio::test]
async fn cancel_that_loses_to_an_approval_keeps_the_row() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let racing = ApprovedMidCancel { inner: c.store.clone(), approver: c.teacher.id };
  let err = lifecycle::cancel(&racing, reg.registration_id, &c.alice.0).await.unwrap_err();
  assert_eq!(violation(err), Violation::NotCancellable(RegistrationStatus::Approved));

  let kept = c.store.find_registration(reg.registration_id).await.unwrap().unwrap();
  assert_eq!(kept.status, RegistrationStatus::Approved);
}

// ─── Check-in ────────────────────────────────────────────────────────────────

/// Alice holds an approved registration for an activity with a QR token.
async fn approved_for_check_in(c: &Campus) -> (Activity, String) {
  let act = activity(&c.store, c.teacher.id).await;
  let token = attendance::issue_qr_token(&c.store, act.activity_id, &c.teacher)
    .await
    .unwrap();
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::approve(&c.store, reg.registration_id, &c.teacher, morning()).await.unwrap();
  (act, token)
}

#[tokio::test]
async fn check_in_respects_window_and_is_idempotent() {
  let c = campus().await;
  let (act, token) = approved_for_check_in(&c).await;
  let id = act.activity_id;

  let err = attendance::check_in(&c.store, id, &token, &c.alice.0, at(9, 59, 59))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NotStarted);

  let err = attendance::check_in(&c.store, id, &token, &c.alice.0, at(12, 0, 1))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::AlreadyEnded);

  let att = attendance::check_in(&c.store, id, &token, &c.alice.0, at(10, 0, 0))
    .await
    .unwrap();
  assert_eq!(att.student_id, c.alice.1.student_id);
  assert_eq!(att.checked_in_by_user_id, c.alice.0.id);
  assert_eq!(att.method, CheckInMethod::Qr);

  let reg = c
    .store
    .find_registration_by_student_and_activity(c.alice.1.student_id, id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(reg.status, RegistrationStatus::Attended);

  let err = attendance::check_in(&c.store, id, &token, &c.alice.0, at(10, 5, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn check_in_requires_an_issued_matching_token() {
  let c = campus().await;
  let bare = activity(&c.store, c.teacher.id).await;
  let err = attendance::check_in(&c.store, bare.activity_id, "anything", &c.alice.0, at(10, 0, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NoQrIssued);

  let err = attendance::check_in(&c.store, Uuid::new_v4(), "anything", &c.alice.0, at(10, 0, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NoQrIssued);

  let (act, _) = approved_for_check_in(&c).await;
  let err = attendance::check_in(&c.store, act.activity_id, "forged", &c.alice.0, at(10, 0, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::TokenMismatch);
}

#[tokio::test]
async fn legacy_qr_codes_still_check_in() {
  let c = campus().await;
  let (act, token) = approved_for_check_in(&c).await;
  let legacy = format!("{token}{}", "0".repeat(qr::LEGACY_TOKEN_LEN - qr::TOKEN_LEN));
  attendance::check_in(&c.store, act.activity_id, &legacy, &c.alice.0, at(11, 0, 0))
    .await
    .unwrap();
}

#[tokio::test]
async fn check_in_requires_an_approved_student_registration() {
  let c = campus().await;
  let (act, token) = approved_for_check_in(&c).await;
  let id = act.activity_id;

  let err = attendance::check_in(&c.store, id, &token, &c.teacher, at(10, 0, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let err = attendance::check_in(&c.store, id, &token, &c.bob.0, at(10, 0, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NotRegistered);

  lifecycle::register(&c.store, &c.bob.0, id, morning()).await.unwrap();
  let err = attendance::check_in(&c.store, id, &token, &c.bob.0, at(10, 0, 0))
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NotApproved(RegistrationStatus::Pending));
}

#[tokio::test]
async fn qr_token_is_issued_once() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;

  let first = attendance::issue_qr_token(&c.store, act.activity_id, &c.teacher).await.unwrap();
  let second = attendance::issue_qr_token(&c.store, act.activity_id, &c.admin).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(first.len(), qr::TOKEN_LEN);

  let err = attendance::issue_qr_token(&c.store, Uuid::new_v4(), &c.teacher).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(..)));
}

#[tokio::test]
async fn only_managers_can_issue_a_qr_token() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let own = activity(&c.store, c.monitor.0.id).await;
  let other_teacher = Caller::new(Uuid::new_v4(), Role::Teacher);

  for (id, caller) in [
    (act.activity_id, c.monitor.0),
    (act.activity_id, c.alice.0),
    (act.activity_id, other_teacher),
    (own.activity_id, c.monitor.0),
  ] {
    let err = attendance::issue_qr_token(&c.store, id, &caller).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{caller:?}");
  }

  let stored = c.store.find_activity(act.activity_id).await.unwrap().unwrap();
  assert!(stored.qr_token.is_none());
}

#[tokio::test]
async fn manager_marks_attendance_manually() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let reg = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let err = attendance::mark_attended(&c.store, reg.registration_id, &c.teacher, morning())
    .await
    .unwrap_err();
  assert_eq!(violation(err), Violation::NotApproved(RegistrationStatus::Pending));

  lifecycle::approve(&c.store, reg.registration_id, &c.monitor.0, morning()).await.unwrap();

  let err = attendance::mark_attended(&c.store, reg.registration_id, &c.monitor.0, morning())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let att = attendance::mark_attended(&c.store, reg.registration_id, &c.teacher, at(13, 0, 0))
    .await
    .unwrap();
  assert_eq!(att.method, CheckInMethod::Manual);
  assert_eq!(att.checked_in_by_user_id, c.teacher.id);

  let err = attendance::mark_attended(&c.store, reg.registration_id, &c.admin, at(13, 1, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_refusal_leaves_every_row_untouched() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let r1 = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let other = class(&c.store, None).await;
  let (outsider, _) = member(&c.store, Role::Student, Some(other.class_id)).await;
  let r2 = lifecycle::register(&c.store, &outsider, act.activity_id, morning())
    .await
    .unwrap();

  let ids = [r1.registration_id, r2.registration_id];
  let err = bulk_apply_approval_action(
    &c.store,
    &ids,
    ApprovalAction::Approve,
    None,
    &c.monitor.0,
    morning(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  for id in ids {
    let reg = c.store.find_registration(id).await.unwrap().unwrap();
    assert_eq!(reg.status, RegistrationStatus::Pending);
  }
}

#[tokio::test]
async fn bulk_missing_id_aborts_before_writing() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let r1 = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();

  let err = bulk_apply_approval_action(
    &c.store,
    &[r1.registration_id, Uuid::new_v4()],
    ApprovalAction::Approve,
    None,
    &c.teacher,
    morning(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, Error::NotFound(..)));

  let reg = c.store.find_registration(r1.registration_id).await.unwrap().unwrap();
  assert_eq!(reg.status, RegistrationStatus::Pending);
}

#[tokio::test]
async fn bulk_approve_and_reject() {
  let c = campus().await;
  let act = activity(&c.store, c.teacher.id).await;
  let a = lifecycle::register(&c.store, &c.alice.0, act.activity_id, morning())
    .await
    .unwrap();
  let b = lifecycle::register(&c.store, &c.bob.0, act.activity_id, morning())
    .await
    .unwrap();
  lifecycle::approve(&c.store, b.registration_id, &c.teacher, morning()).await.unwrap();

  // `b` is already approved: skipped, not counted. Duplicate ids collapse.
  let outcome = bulk_apply_approval_action(
    &c.store,
    &[a.registration_id, b.registration_id, a.registration_id],
    ApprovalAction::Approve,
    None,
    &c.monitor.0,
    morning(),
  )
  .await
  .unwrap();
  assert_eq!(outcome.updated_count, 1);

  let outcome = bulk_apply_approval_action(
    &c.store,
    &[a.registration_id, b.registration_id],
    ApprovalAction::Reject,
    Some("event cancelled".into()),
    &c.teacher,
    morning(),
  )
  .await
  .unwrap();
  assert_eq!(outcome.updated_count, 2);

  for id in [a.registration_id, b.registration_id] {
    let reg = c.store.find_registration(id).await.unwrap().unwrap();
    assert_eq!(reg.status, RegistrationStatus::Rejected);
    assert_eq!(reg.rejection_reason.as_deref(), Some("event cancelled"));
  }
}

#[tokio::test]
async fn bulk_requires_ids() {
  let c = campus().await;
  let err = bulk_apply_approval_action(
    &c.store,
    &[],
    ApprovalAction::Approve,
    None,
    &c.admin,
    morning(),
  )
  .await
  .unwrap_err();
  assert_eq!(violation(err), Violation::EmptyBatch);
}

// ─── Activity lifecycle ──────────────────────────────────────────────────────

/// Runs 10:00–12:00 with registration closing at 09:00.
fn proposal() -> NewActivity {
  NewActivity {
    title:                 "Blood drive".into(),
    class_id:              None,
    start_at:              at(10, 0, 0),
    end_at:                at(12, 0, 0),
    registration_deadline: at(9, 0, 0),
    capacity:              None,
  }
}

#[tokio::test]
async fn teachers_publish_and_monitors_propose() {
  let c = campus().await;

  let published = activities::propose(&c.store, &c.teacher, proposal()).await.unwrap();
  assert_eq!(published.status, ActivityStatus::Approved);
  assert_eq!(published.creator_user_id, c.teacher.id);
  assert!(published.qr_token.is_none());

  let proposed = activities::propose(&c.store, &c.monitor.0, proposal()).await.unwrap();
  assert_eq!(proposed.status, ActivityStatus::Pending);
  assert_eq!(proposed.class_id, Some(c.class_id));
  assert_eq!(c.store.find_activity(proposed.activity_id).await.unwrap(), Some(proposed));

  let err = activities::propose(&c.store, &c.alice.0, proposal()).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn monitors_propose_only_for_their_own_class() {
  let c = campus().await;
  let other = class(&c.store, None).await;

  let foreign = NewActivity { class_id: Some(other.class_id), ..proposal() };
  let err = activities::propose(&c.store, &c.monitor.0, foreign).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let (orphan, _) = member(&c.store, Role::ClassMonitor, None).await;
  let err = activities::propose(&c.store, &orphan, proposal()).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let missing = NewActivity { class_id: Some(Uuid::new_v4()), ..proposal() };
  let err = activities::propose(&c.store, &c.teacher, missing).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(Entity::Class, _)));
}

#[tokio::test]
async fn invalid_schedule_is_rejected_before_writing() {
  let c = campus().await;
  let late = NewActivity { registration_deadline: at(10, 0, 0), ..proposal() };
  let err = activities::propose(&c.store, &c.teacher, late).await.unwrap_err();
  assert!(matches!(violation(err), Violation::InvalidActivity(_)));
  assert!(c.store.list_activities(&Scope::AllowAll).await.unwrap().is_empty());
}

#[tokio::test]
async fn homeroom_teacher_reviews_class_proposals_once() {
  let c = campus().await;
  let proposed = activities::propose(&c.store, &c.monitor.0, proposal()).await.unwrap();
  let id = proposed.activity_id;
  let other_teacher = Caller::new(Uuid::new_v4(), Role::Teacher);

  for caller in [other_teacher, c.monitor.0, c.alice.0] {
    let err = activities::approve_activity(&c.store, id, &caller).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{caller:?}");
  }

  let err = lifecycle::register(&c.store, &c.bob.0, id, morning()).await.unwrap_err();
  assert_eq!(violation(err), Violation::ActivityNotApproved);

  let approved = activities::approve_activity(&c.store, id, &c.teacher).await.unwrap();
  assert_eq!(approved.status, ActivityStatus::Approved);
  lifecycle::register(&c.store, &c.bob.0, id, morning()).await.unwrap();

  let err = activities::reject_activity(&c.store, id, None, &c.admin).await.unwrap_err();
  assert_eq!(violation(err), Violation::ActivityAlreadyReviewed(ActivityStatus::Approved));

  let err = activities::approve_activity(&c.store, Uuid::new_v4(), &c.admin).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(Entity::Activity, _)));
}

#[tokio::test]
async fn institution_wide_proposals_are_reviewed_by_admins() {
  let c = campus().await;
  let mut pending = activity(&c.store, c.monitor.0.id).await;
  pending.status = ActivityStatus::Pending;
  let pending = c.store.insert_activity(pending).await.unwrap();
  let id = pending.activity_id;

  let err = activities::reject_activity(&c.store, id, None, &c.teacher).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden(_)));

  let reason = Some("  clashes with exams ".to_owned());
  let rejected = activities::reject_activity(&c.store, id, reason, &c.admin).await.unwrap();
  assert_eq!(rejected.status, ActivityStatus::Rejected);
  assert_eq!(rejected.rejection_reason.as_deref(), Some("clashes with exams"));

  let err = activities::approve_activity(&c.store, id, &c.admin).await.unwrap_err();
  assert_eq!(violation(err), Violation::ActivityAlreadyReviewed(ActivityStatus::Rejected));
}
