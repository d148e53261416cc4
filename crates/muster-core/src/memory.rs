//! [`MemoryStore`]: an in-process implementation of [`RosterStore`].
//!
//! Every method runs under a single mutex, which makes each call atomic in
//! the same way a single SQL statement is. Scopes are evaluated with the
//! reference semantics in [`crate::scope`].

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
};

use thiserror::Error;
use uuid::Uuid;

use crate::{
  activity::{Activity, ActivityReview, ActivityStatus},
  attendance::{Attendance, NewAttendance},
  directory::{Class, Student},
  registration::{
    NewRegistration, Registration, RegistrationInsert, RegistrationStatus, Transition,
  },
  scope::Scope,
  store::RosterStore,
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("memory store is unavailable")]
  Unavailable,

  /// Another student record already belongs to this user.
  #[error("user {0} already has a student record")]
  DuplicateUser(Uuid),
}

#[derive(Default)]
struct State {
  classes:       BTreeMap<Uuid, Class>,
  students:      BTreeMap<Uuid, Student>,
  activities:    BTreeMap<Uuid, Activity>,
  registrations: BTreeMap<Uuid, Registration>,
  attendances:   Vec<Attendance>,
}

/// A Muster store held entirely in memory.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
  state:       Arc<Mutex<State>>,
  unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// While set, every call fails with [`MemoryError::Unavailable`].
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, MemoryError> {
    if self.unavailable.load(Ordering::SeqCst) {
      return Err(MemoryError::Unavailable);
    }
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(f(&mut state))
  }
}

impl RosterStore for MemoryStore {
  type Error = MemoryError;

  // ── Directory ─────────────────────────────────────────────────────────────

  async fn find_class(&self, class_id: Uuid) -> Result<Option<Class>, MemoryError> {
    self.with(|s| s.classes.get(&class_id).cloned())
  }

  async fn find_classes_by_homeroom_teacher(
    &self,
    teacher_id: Uuid,
  ) -> Result<Vec<Class>, MemoryError> {
    self.with(|s| {
      s.classes
        .values()
        .filter(|c| c.homeroom_teacher_id == Some(teacher_id))
        .cloned()
        .collect()
    })
  }

  async fn find_student(&self, student_id: Uuid) -> Result<Option<Student>, MemoryError> {
    self.with(|s| s.students.get(&student_id).cloned())
  }

  async fn find_student_by_user(&self, user_id: Uuid) -> Result<Option<Student>, MemoryError> {
    self.with(|s| s.students.values().find(|st| st.user_id == user_id).cloned())
  }

  async fn find_students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>, MemoryError> {
    self.with(|s| {
      s.students
        .values()
        .filter(|st| st.class_id == Some(class_id))
        .cloned()
        .collect()
    })
  }

  async fn insert_class(&self, class: Class) -> Result<Class, MemoryError> {
    self.with(|s| {
      s.classes.insert(class.class_id, class.clone());
      class
    })
  }

  async fn insert_student(&self, student: Student) -> Result<Student, MemoryError> {
    self.with(|s| {
      let taken = s
        .students
        .values()
        .any(|st| st.user_id == student.user_id && st.student_id != student.student_id);
      if taken {
        return Err(MemoryError::DuplicateUser(student.user_id));
      }
      s.students.insert(student.student_id, student.clone());
      Ok(student)
    })?
  }

  // ── Activities ────────────────────────────────────────────────────────────

  async fn find_activity(&self, activity_id: Uuid) -> Result<Option<Activity>, MemoryError> {
    self.with(|s| s.activities.get(&activity_id).cloned())
  }

  async fn insert_activity(&self, activity: Activity) -> Result<Activity, MemoryError> {
    self.with(|s| {
      s.activities.insert(activity.activity_id, activity.clone());
      activity
    })
  }

  async fn set_qr_token_if_absent(
    &self,
    activity_id: Uuid,
    token: String,
  ) -> Result<Option<String>, MemoryError> {
    self.with(|s| {
      let activity = s.activities.get_mut(&activity_id)?;
      let current = activity.qr_token.get_or_insert_with(String::new);
      if current.trim().is_empty() {
        *current = token;
      }
      Some(current.clone())
    })
  }

  async fn review_activity_if_pending<'a>(
    &'a self,
    activity_id: Uuid,
    review: &'a ActivityReview,
  ) -> Result<Option<Activity>, MemoryError> {
    self.with(|s| {
      let activity = s.activities.get_mut(&activity_id)?;
      if activity.status != ActivityStatus::Pending {
        return None;
      }
      review.apply_to(activity);
      Some(activity.clone())
    })
  }

  // ── Registrations ─────────────────────────────────────────────────────────

  async fn find_registration(
    &self,
    registration_id: Uuid,
  ) -> Result<Option<Registration>, MemoryError> {
    self.with(|s| s.registrations.get(&registration_id).cloned())
  }

  async fn find_registration_by_student_and_activity(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Registration>, MemoryError> {
    self.with(|s| {
      s.registrations
        .values()
        .find(|r| r.student_id == student_id && r.activity_id == activity_id)
        .cloned()
    })
  }

  async fn create_registration(
    &self,
    input: NewRegistration,
  ) -> Result<RegistrationInsert, MemoryError> {
    self.with(|s| {
      if let Some(capacity) = input.capacity {
        let held = s
          .registrations
          .values()
          .filter(|r| {
            r.activity_id == input.activity_id
              && RegistrationStatus::SEAT_HOLDING.contains(&r.status)
          })
          .count();
        if held >= capacity as usize {
          return RegistrationInsert::Full;
        }
      }

      let duplicate = s
        .registrations
        .values()
        .any(|r| r.student_id == input.student_id && r.activity_id == input.activity_id);
      if duplicate {
        return RegistrationInsert::Duplicate;
      }

      let reg = Registration {
        registration_id:  Uuid::new_v4(),
        student_id:       input.student_id,
        activity_id:      input.activity_id,
        status:           RegistrationStatus::Pending,
        created_at:       input.created_at,
        approved_at:      None,
        approver_id:      None,
        rejection_reason: None,
      };
      s.registrations.insert(reg.registration_id, reg.clone());
      RegistrationInsert::Created(reg)
    })
  }

  async fn update_registration_status<'a>(
    &'a self,
    registration_id: Uuid,
    transition: &'a Transition,
  ) -> Result<Option<Registration>, MemoryError> {
    self.with(|s| {
      let reg = s.registrations.get_mut(&registration_id)?;
      if !transition.allows(reg.status) {
        return None;
      }
      transition.apply_to(reg);
      Some(reg.clone())
    })
  }

  async fn bulk_update_registration_status<'a>(
    &'a self,
    ids: &'a [Uuid],
    transition: &'a Transition,
  ) -> Result<u64, MemoryError> {
    self.with(|s| {
      let mut updated = 0;
      for id in ids {
        if let Some(reg) = s.registrations.get_mut(id)
          && transition.allows(reg.status)
        {
          transition.apply_to(reg);
          updated += 1;
        }
      }
      updated
    })
  }

  async fn delete_registration_if_cancellable(
    &self,
    registration_id: Uuid,
  ) -> Result<bool, MemoryError> {
    self.with(|s| {
      let cancellable = s
        .registrations
        .get(&registration_id)
        .is_some_and(|r| r.status.is_cancellable());
      if cancellable {
        s.registrations.remove(&registration_id);
      }
      cancellable
    })
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  async fn find_attendance(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Attendance>, MemoryError> {
    self.with(|s| {
      s.attendances
        .iter()
        .find(|a| a.student_id == student_id && a.activity_id == activity_id)
        .cloned()
    })
  }

  async fn insert_attendance_if_absent(
    &self,
    input: NewAttendance,
  ) -> Result<Option<Attendance>, MemoryError> {
    self.with(|s| {
      let taken = s
        .attendances
        .iter()
        .any(|a| a.student_id == input.student_id && a.activity_id == input.activity_id);
      if taken {
        return None;
      }
      let attendance = Attendance {
        attendance_id:         Uuid::new_v4(),
        student_id:            input.student_id,
        activity_id:           input.activity_id,
        checked_in_at:         input.checked_in_at,
        checked_in_by_user_id: input.checked_in_by_user_id,
        method:                input.method,
      };
      s.attendances.push(attendance.clone());
      Some(attendance)
    })
  }

  // ── Scoped listings ───────────────────────────────────────────────────────

  async fn list_activities<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Activity>, MemoryError> {
    self.with(|s| {
      let mut rows: Vec<Activity> = s
        .activities
        .values()
        .filter(|a| scope.admits_activity(a))
        .cloned()
        .collect();
      rows.sort_by_key(|a| (a.start_at, a.activity_id));
      rows
    })
  }

  async fn list_registrations<'a>(
    &'a self,
    scope: &'a Scope,
  ) -> Result<Vec<Registration>, MemoryError> {
    self.with(|s| {
      let mut rows: Vec<Registration> = s
        .registrations
        .values()
        .filter(|r| scope.admits_registration(r, s.students.get(&r.student_id)))
        .cloned()
        .collect();
      rows.sort_by_key(|r| (r.created_at, r.registration_id));
      rows
    })
  }

  async fn list_students<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Student>, MemoryError> {
    self.with(|s| {
      s.students
        .values()
        .filter(|st| scope.admits_student(st))
        .cloned()
        .collect()
    })
  }

  async fn list_classes<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Class>, MemoryError> {
    self.with(|s| {
      s.classes
        .values()
        .filter(|c| scope.admits_class(c))
        .cloned()
        .collect()
    })
  }
}
