//! [`SqliteStore`]: the SQLite implementation of [`RosterStore`].

use std::path::Path;

use muster_core::{
  activity::{Activity, ActivityReview, ActivityStatus},
  attendance::{Attendance, NewAttendance},
  directory::{Class, Student},
  registration::{
    NewRegistration, Registration, RegistrationInsert, RegistrationStatus, Transition,
  },
  scope::{Resource, Scope},
  store::RosterStore,
};
use rusqlite::{OptionalExtension as _, Row, params, params_from_iter, types::Value};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RawActivity, RawAttendance, RawClass, RawRegistration, RawStudent, encode_dt, encode_uuid,
  },
  filter::{self, placeholders},
  schema::SCHEMA,
};

type RowMapper<R> = fn(&Row<'_>) -> rusqlite::Result<R>;

fn text(s: String) -> Value { Value::Text(s) }

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

/// `SET` clause and bound values for a status transition.
fn transition_set(transition: &Transition) -> (&'static str, Vec<Value>) {
  let status = text(transition.target().as_ref().to_owned());
  match transition {
    Transition::Approve { approver_id, at } => (
      "status = ?, approver_id = ?, approved_at = ?, rejection_reason = NULL",
      vec![status, text(encode_uuid(*approver_id)), text(encode_dt(*at))],
    ),
    Transition::Reject { approver_id, at, reason } => (
      "status = ?, approver_id = ?, approved_at = ?, rejection_reason = ?",
      vec![
        status,
        text(encode_uuid(*approver_id)),
        text(encode_dt(*at)),
        text(reason.clone()),
      ],
    ),
    Transition::Attend => ("status = ?", vec![status]),
  }
}

/// Quoted, comma-separated status literals for an `IN (...)` list.
fn status_list<T: AsRef<str>>(statuses: &[T]) -> String {
  statuses
    .iter()
    .map(|s| format!("'{}'", s.as_ref()))
    .collect::<Vec<_>>()
    .join(", ")
}

/// `status IN (...)` over the transition's eligible source statuses.
fn eligible_clause(transition: &Transition) -> String {
  format!("status IN ({})", status_list(transition.eligible_from()))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Muster roster store backed by a single SQLite file.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_optional<R: Send + 'static>(
    &self,
    sql: String,
    params: Vec<Value>,
    map: RowMapper<R>,
  ) -> Result<Option<R>> {
    let row = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, params_from_iter(params), map).optional()?)
      })
      .await?;
    Ok(row)
  }

  async fn fetch_all<R: Send + 'static>(
    &self,
    sql: String,
    params: Vec<Value>,
    map: RowMapper<R>,
  ) -> Result<Vec<R>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params), map)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Fetch the rows of `resource` admitted by `scope`. The resource name is
  /// also its table name.
  async fn fetch_scoped<R: Send + 'static>(
    &self,
    resource: Resource,
    scope: &Scope,
    columns: &str,
    order_by: &str,
    map: RowMapper<R>,
  ) -> Result<Vec<R>> {
    let filter = filter::compile(scope, resource);
    tracing::debug!(%resource, clause = %filter.clause, "scoped listing");
    let sql = format!(
      "SELECT {columns} FROM {resource} WHERE {} ORDER BY {order_by}",
      filter.clause
    );
    self.fetch_all(sql, filter.params, map).await
  }

  async fn registration_by_id(&self, id: String) -> Result<Option<Registration>> {
    let sql = format!(
      "SELECT {} FROM registrations WHERE registration_id = ?1",
      RawRegistration::COLUMNS
    );
    let raw = self.fetch_optional(sql, vec![text(id)], RawRegistration::from_row).await?;
    raw.map(RawRegistration::into_registration).transpose()
  }
}

// ─── RosterStore impl ────────────────────────────────────────────────────────

impl RosterStore for SqliteStore {
  type Error = crate::Error;

  // ── Directory ─────────────────────────────────────────────────────────────

  async fn find_class(&self, class_id: Uuid) -> Result<Option<Class>> {
    let sql = format!("SELECT {} FROM classes WHERE class_id = ?1", RawClass::COLUMNS);
    let raw = self
      .fetch_optional(sql, vec![text(encode_uuid(class_id))], RawClass::from_row)
      .await?;
    raw.map(RawClass::into_class).transpose()
  }

  async fn find_classes_by_homeroom_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>> {
    let sql = format!(
      "SELECT {} FROM classes WHERE homeroom_teacher_id = ?1 ORDER BY class_id",
      RawClass::COLUMNS
    );
    let raws = self
      .fetch_all(sql, vec![text(encode_uuid(teacher_id))], RawClass::from_row)
      .await?;
    raws.into_iter().map(RawClass::into_class).collect()
  }

  async fn find_student(&self, student_id: Uuid) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE student_id = ?1", RawStudent::COLUMNS);
    let raw = self
      .fetch_optional(sql, vec![text(encode_uuid(student_id))], RawStudent::from_row)
      .await?;
    raw.map(RawStudent::into_student).transpose()
  }

  async fn find_student_by_user(&self, user_id: Uuid) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE user_id = ?1", RawStudent::COLUMNS);
    let raw = self
      .fetch_optional(sql, vec![text(encode_uuid(user_id))], RawStudent::from_row)
      .await?;
    raw.map(RawStudent::into_student).transpose()
  }

  async fn find_students_by_class(&self, class_id: Uuid) -> Result<Vec<Student>> {
    let sql = format!(
      "SELECT {} FROM students WHERE class_id = ?1 ORDER BY student_id",
      RawStudent::COLUMNS
    );
    let raws = self
      .fetch_all(sql, vec![text(encode_uuid(class_id))], RawStudent::from_row)
      .await?;
    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn insert_class(&self, class: Class) -> Result<Class> {
    let id_str      = encode_uuid(class.class_id);
    let name        = class.name.clone();
    let teacher_str = class.homeroom_teacher_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO classes (class_id, name, homeroom_teacher_id) VALUES (?1, ?2, ?3)
           ON CONFLICT (class_id) DO UPDATE SET
             name = excluded.name,
             homeroom_teacher_id = excluded.homeroom_teacher_id",
          params![id_str, name, teacher_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(class)
  }

  async fn insert_student(&self, student: Student) -> Result<Student> {
    let id_str    = encode_uuid(student.student_id);
    let user_str  = encode_uuid(student.user_id);
    let class_str = student.class_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, user_id, class_id) VALUES (?1, ?2, ?3)
           ON CONFLICT (student_id) DO UPDATE SET
             user_id = excluded.user_id,
             class_id = excluded.class_id",
          params![id_str, user_str, class_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(student)
  }

  // ── Activities ────────────────────────────────────────────────────────────

  async fn find_activity(&self, activity_id: Uuid) -> Result<Option<Activity>> {
    let sql = format!("SELECT {} FROM activities WHERE activity_id = ?1", RawActivity::COLUMNS);
    let raw = self
      .fetch_optional(sql, vec![text(encode_uuid(activity_id))], RawActivity::from_row)
      .await?;
    raw.map(RawActivity::into_activity).transpose()
  }

  async fn insert_activity(&self, activity: Activity) -> Result<Activity> {
    let id_str       = encode_uuid(activity.activity_id);
    let title        = activity.title.clone();
    let creator_str  = encode_uuid(activity.creator_user_id);
    let class_str    = activity.class_id.map(encode_uuid);
    let status_str   = activity.status.as_ref().to_owned();
    let start_str    = encode_dt(activity.start_at);
    let end_str      = encode_dt(activity.end_at);
    let deadline_str = encode_dt(activity.registration_deadline);
    let capacity     = activity.capacity.map(i64::from);
    let qr_token     = activity.qr_token.clone();
    let reason       = activity.rejection_reason.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activities (
             activity_id, title, creator_user_id, class_id, status,
             start_at, end_at, registration_deadline, capacity, qr_token,
             rejection_reason
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (activity_id) DO UPDATE SET
             title = excluded.title,
             creator_user_id = excluded.creator_user_id,
             class_id = excluded.class_id,
             status = excluded.status,
             start_at = excluded.start_at,
             end_at = excluded.end_at,
             registration_deadline = excluded.registration_deadline,
             capacity = excluded.capacity,
             qr_token = excluded.qr_token,
             rejection_reason = excluded.rejection_reason",
          params![
            id_str,
            title,
            creator_str,
            class_str,
            status_str,
            start_str,
            end_str,
            deadline_str,
            capacity,
            qr_token,
            reason,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(activity)
  }

  async fn set_qr_token_if_absent(
    &self,
    activity_id: Uuid,
    token: String,
  ) -> Result<Option<String>> {
    let id_str = encode_uuid(activity_id);

    let stored: Option<Option<String>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE activities SET qr_token = ?2
           WHERE activity_id = ?1 AND (qr_token IS NULL OR trim(qr_token) = '')",
          params![id_str, token],
        )?;
        let stored = tx
          .query_row(
            "SELECT qr_token FROM activities WHERE activity_id = ?1",
            params![id_str],
            |row| row.get(0),
          )
          .optional()?;
        tx.commit()?;
        Ok(stored)
      })
      .await?;

    Ok(stored.flatten())
  }

  async fn review_activity_if_pending<'a>(
    &'a self,
    activity_id: Uuid,
    review: &'a ActivityReview,
  ) -> Result<Option<Activity>> {
    let id_str      = encode_uuid(activity_id);
    let target_str  = review.target().as_ref().to_owned();
    let pending_str = ActivityStatus::Pending.as_ref().to_owned();
    let reason      = match review {
      ActivityReview::Approve => None,
      ActivityReview::Reject { reason } => Some(reason.clone()),
    };
    let select = format!("SELECT {} FROM activities WHERE activity_id = ?1", RawActivity::COLUMNS);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE activities SET status = ?2, rejection_reason = ?3
           WHERE activity_id = ?1 AND status = ?4",
          params![id_str, target_str, reason, pending_str],
        )?;
        let row = if changed == 0 {
          None
        } else {
          tx.query_row(&select, params![id_str], RawActivity::from_row)
            .optional()?
        };
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.map(RawActivity::into_activity).transpose()
  }

  // ── Registrations ─────────────────────────────────────────────────────────

  async fn find_registration(&self, registration_id: Uuid) -> Result<Option<Registration>> {
    self.registration_by_id(encode_uuid(registration_id)).await
  }

  async fn find_registration_by_student_and_activity(
    &self,
    student_id:  Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Registration>> {
    let sql = format!(
      "SELECT {} FROM registrations WHERE student_id = ?1 AND activity_id = ?2",
      RawRegistration::COLUMNS
    );
    let params = vec![text(encode_uuid(student_id)), text(encode_uuid(activity_id))];
    let raw = self.fetch_optional(sql, params, RawRegistration::from_row).await?;
    raw.map(RawRegistration::into_registration).transpose()
  }

  async fn create_registration(&self, input: NewRegistration) -> Result<RegistrationInsert> {
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

    let id_str       = encode_uuid(reg.registration_id);
    let student_str  = encode_uuid(reg.student_id);
    let activity_str = encode_uuid(reg.activity_id);
    let status_str   = reg.status.as_ref().to_owned();
    let at_str       = encode_dt(reg.created_at);
    let capacity     = input.capacity.map(i64::from);
    let holding      = status_list(RegistrationStatus::SEAT_HOLDING);

    // Capacity and uniqueness are decided by this one statement.
    let sql = format!(
      "INSERT INTO registrations (registration_id, student_id, activity_id, status, created_at)
       SELECT ?1, ?2, ?3, ?4, ?5
       WHERE ?6 IS NULL
          OR (SELECT COUNT(*) FROM registrations
              WHERE activity_id = ?3 AND status IN ({holding})) < ?6"
    );

    let inserted: Option<usize> = self
      .conn
      .call(move |conn| {
        match conn.execute(
          &sql,
          params![id_str, student_str, activity_str, status_str, at_str, capacity],
        ) {
          Ok(n) => Ok(Some(n)),
          Err(e) if is_unique_violation(&e) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    Ok(match inserted {
      None => RegistrationInsert::Duplicate,
      Some(0) => RegistrationInsert::Full,
      Some(_) => RegistrationInsert::Created(reg),
    })
  }

  async fn update_registration_status<'a>(
    &'a self,
    registration_id: Uuid,
    transition: &'a Transition,
  ) -> Result<Option<Registration>> {
    let (set, mut values) = transition_set(transition);
    let id_str = encode_uuid(registration_id);
    values.push(text(id_str.clone()));

    let sql = format!(
      "UPDATE registrations SET {set} WHERE registration_id = ? AND {}",
      eligible_clause(transition)
    );
    let select = format!(
      "SELECT {} FROM registrations WHERE registration_id = ?1",
      RawRegistration::COLUMNS
    );

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(&sql, params_from_iter(values))?;
        let row = if changed == 0 {
          None
        } else {
          tx.query_row(&select, params![id_str], RawRegistration::from_row)
            .optional()?
        };
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.map(RawRegistration::into_registration).transpose()
  }

  async fn bulk_update_registration_status<'a>(
    &'a self,
    ids: &'a [Uuid],
    transition: &'a Transition,
  ) -> Result<u64> {
    if ids.is_empty() {
      return Ok(0);
    }

    let (set, mut values) = transition_set(transition);
    values.extend(ids.iter().map(|id| text(encode_uuid(*id))));

    let sql = format!(
      "UPDATE registrations SET {set} WHERE registration_id IN ({}) AND {}",
      placeholders(ids.len()),
      eligible_clause(transition)
    );

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(values))?))
      .await?;
    Ok(changed as u64)
  }

  async fn delete_registration_if_cancellable(&self, registration_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(registration_id);
    let sql = format!(
      "DELETE FROM registrations WHERE registration_id = ?1 AND status IN ({})",
      status_list(RegistrationStatus::CANCELLABLE)
    );

    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params![id_str])?))
      .await?;
    Ok(deleted > 0)
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  async fn find_attendance(
    &self,
    student_id:  Uuid,
    activity_id: Uuid,
  ) -> Result<Option<Attendance>> {
    let sql = format!(
      "SELECT {} FROM attendances WHERE student_id = ?1 AND activity_id = ?2",
      RawAttendance::COLUMNS
    );
    let params = vec![text(encode_uuid(student_id)), text(encode_uuid(activity_id))];
    let raw = self.fetch_optional(sql, params, RawAttendance::from_row).await?;
    raw.map(RawAttendance::into_attendance).transpose()
  }

  async fn insert_attendance_if_absent(&self, input: NewAttendance) -> Result<Option<Attendance>> {
    let attendance = Attendance {
      attendance_id:         Uuid::new_v4(),
      student_id:            input.student_id,
      activity_id:           input.activity_id,
      checked_in_at:         input.checked_in_at,
      checked_in_by_user_id: input.checked_in_by_user_id,
      method:                input.method,
    };

    let id_str       = encode_uuid(attendance.attendance_id);
    let student_str  = encode_uuid(attendance.student_id);
    let activity_str = encode_uuid(attendance.activity_id);
    let at_str       = encode_dt(attendance.checked_in_at);
    let by_str       = encode_uuid(attendance.checked_in_by_user_id);
    let method_str   = attendance.method.as_ref().to_owned();

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO attendances (
             attendance_id, student_id, activity_id,
             checked_in_at, checked_in_by_user_id, method
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (student_id, activity_id) DO NOTHING",
          params![id_str, student_str, activity_str, at_str, by_str, method_str],
        )?)
      })
      .await?;

    Ok((inserted > 0).then_some(attendance))
  }

  // ── Scoped listings ───────────────────────────────────────────────────────

  async fn list_activities<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Activity>> {
    let raws = self
      .fetch_scoped(
        Resource::Activities,
        scope,
        RawActivity::COLUMNS,
        "start_at, activity_id",
        RawActivity::from_row,
      )
      .await?;
    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn list_registrations<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Registration>> {
    let raws = self
      .fetch_scoped(
        Resource::Registrations,
        scope,
        RawRegistration::COLUMNS,
        "created_at, registration_id",
        RawRegistration::from_row,
      )
      .await?;
    raws.into_iter().map(RawRegistration::into_registration).collect()
  }

  async fn list_students<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Student>> {
    let raws = self
      .fetch_scoped(
        Resource::Students,
        scope,
        RawStudent::COLUMNS,
        "student_id",
        RawStudent::from_row,
      )
      .await?;
    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn list_classes<'a>(&'a self, scope: &'a Scope) -> Result<Vec<Class>> {
    let raws = self
      .fetch_scoped(
        Resource::Classes,
        scope,
        RawClass::COLUMNS,
        "class_id",
        RawClass::from_row,
      )
      .await?;
    raws.into_iter().map(RawClass::into_class).collect()
  }
}
