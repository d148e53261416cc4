//! The `RosterStore` trait: the storage port the core is written against.
//!
//! The trait is implemented by storage backends (e.g. `muster-store-sqlite`)
//! and by the in-memory [`crate::memory::MemoryStore`]. Every write that
//! guards an invariant is a single conditional statement on the backend side;
//! outcomes such as "duplicate" or "already checked in" are returned as values
//! so the core can map them onto its own error taxonomy.

use std::future::Future;

use uuid::Uuid;

use crate::{
  activity::{Activity, ActivityReview},
  attendance::{Attendance, NewAttendance},
  directory::{Class, Student},
  registration::{NewRegistration, Registration, RegistrationInsert, Transition},
  scope::Scope,
};

/// Abstraction over a Muster storage backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait RosterStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Directory ─────────────────────────────────────────────────────────

  fn find_class(
    &self,
    class_id: Uuid,
  ) -> impl Future<Output = Result<Option<Class>, Self::Error>> + Send + '_;

  /// Classes whose homeroom teacher is `teacher_id`.
  fn find_classes_by_homeroom_teacher(
    &self,
    teacher_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  fn find_student(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn find_student_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn find_students_by_class(
    &self,
    class_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  fn insert_class(
    &self,
    class: Class,
  ) -> impl Future<Output = Result<Class, Self::Error>> + Send + '_;

  fn insert_student(
    &self,
    student: Student,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  // ── Activities ────────────────────────────────────────────────────────

  fn find_activity(
    &self,
    activity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Activity>, Self::Error>> + Send + '_;

  fn insert_activity(
    &self,
    activity: Activity,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  /// Set the activity's QR token unless one is already present, and return
  /// whichever token is stored afterwards. `None` if the activity is absent.
  fn set_qr_token_if_absent(
    &self,
    activity_id: Uuid,
    token: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Apply `review` iff the activity is still pending. Returns the updated
  /// row, or `None` if the activity is absent or already reviewed.
  fn review_activity_if_pending<'a>(
    &'a self,
    activity_id: Uuid,
    review: &'a ActivityReview,
  ) -> impl Future<Output = Result<Option<Activity>, Self::Error>> + Send + 'a;

  // ── Registrations ─────────────────────────────────────────────────────

  fn find_registration(
    &self,
    registration_id: Uuid,
  ) -> impl Future<Output = Result<Option<Registration>, Self::Error>> + Send + '_;

  fn find_registration_by_student_and_activity(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Registration>, Self::Error>> + Send + '_;

  /// Insert a pending registration, atomically enforcing the
  /// `(student_id, activity_id)` uniqueness and the seat capacity.
  fn create_registration(
    &self,
    input: NewRegistration,
  ) -> impl Future<Output = Result<RegistrationInsert, Self::Error>> + Send + '_;

  /// Apply `transition` iff the current status is one of
  /// [`Transition::eligible_from`]. Returns the updated row, or `None` if the
  /// row is absent or no longer eligible.
  fn update_registration_status<'a>(
    &'a self,
    registration_id: Uuid,
    transition: &'a Transition,
  ) -> impl Future<Output = Result<Option<Registration>, Self::Error>> + Send + 'a;

  /// Apply `transition` to every eligible row among `ids` in one atomic
  /// batch. Returns the number of rows changed.
  fn bulk_update_registration_status<'a>(
    &'a self,
    ids: &'a [Uuid],
    transition: &'a Transition,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Delete the registration iff its status is one of
  /// [`RegistrationStatus::CANCELLABLE`]. Returns whether a row was deleted.
  ///
  /// [`RegistrationStatus::CANCELLABLE`]: crate::registration::RegistrationStatus::CANCELLABLE
  fn delete_registration_if_cancellable(
    &self,
    registration_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Attendance ────────────────────────────────────────────────────────

  fn find_attendance(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Attendance>, Self::Error>> + Send + '_;

  /// Insert an attendance row unless one already exists for the
  /// `(student_id, activity_id)` pair. `None` means the pair was taken.
  fn insert_attendance_if_absent(
    &self,
    input: NewAttendance,
  ) -> impl Future<Output = Result<Option<Attendance>, Self::Error>> + Send + '_;

  // ── Scoped listings ───────────────────────────────────────────────────

  fn list_activities<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + 'a;

  fn list_registrations<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Vec<Registration>, Self::Error>> + Send + 'a;

  fn list_students<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + 'a;

  fn list_classes<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + 'a;
}
