//! Encoding and decoding helpers between Muster domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings in UTC with a fixed microsecond
//! precision, so they sort lexically. UUIDs are stored as hyphenated
//! lowercase strings. Enums are stored as their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use muster_core::{
  activity::{Activity, ActivityStatus},
  attendance::{Attendance, CheckInMethod},
  directory::{Class, Student},
  registration::{Registration, RegistrationStatus},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_enum<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `classes` row.
pub struct RawClass {
  pub class_id:            String,
  pub name:                String,
  pub homeroom_teacher_id: Option<String>,
}

impl RawClass {
  pub const COLUMNS: &'static str = "class_id, name, homeroom_teacher_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      class_id:            row.get(0)?,
      name:                row.get(1)?,
      homeroom_teacher_id: row.get(2)?,
    })
  }

  pub fn into_class(self) -> Result<Class> {
    Ok(Class {
      class_id:            decode_uuid(&self.class_id)?,
      name:                self.name,
      homeroom_teacher_id: decode_opt_uuid(self.homeroom_teacher_id)?,
    })
  }
}

/// Raw strings read directly from a `students` row.
pub struct RawStudent {
  pub student_id: String,
  pub user_id:    String,
  pub class_id:   Option<String>,
}

impl RawStudent {
  pub const COLUMNS: &'static str = "student_id, user_id, class_id";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id: row.get(0)?,
      user_id:    row.get(1)?,
      class_id:   row.get(2)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id: decode_uuid(&self.student_id)?,
      user_id:    decode_uuid(&self.user_id)?,
      class_id:   decode_opt_uuid(self.class_id)?,
    })
  }
}

/// Raw values read directly from an `activities` row.
pub struct RawActivity {
  pub activity_id:           String,
  pub title:                 String,
  pub creator_user_id:       String,
  pub class_id:              Option<String>,
  pub status:                String,
  pub start_at:              String,
  pub end_at:                String,
  pub registration_deadline: String,
  pub capacity:              Option<i64>,
  pub qr_token:              Option<String>,
  pub rejection_reason:      Option<String>,
}

impl RawActivity {
  pub const COLUMNS: &'static str = "activity_id, title, creator_user_id, class_id, status, \
                             start_at, end_at, registration_deadline, capacity, qr_token, \
                             rejection_reason";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:           row.get(0)?,
      title:                 row.get(1)?,
      creator_user_id:       row.get(2)?,
      class_id:              row.get(3)?,
      status:                row.get(4)?,
      start_at:              row.get(5)?,
      end_at:                row.get(6)?,
      registration_deadline: row.get(7)?,
      capacity:              row.get(8)?,
      qr_token:              row.get(9)?,
      rejection_reason:      row.get(10)?,
    })
  }

  pub fn into_activity(self) -> Result<Activity> {
    let capacity = self
      .capacity
      .map(|c| {
        u32::try_from(c).map_err(|_| Error::Decode(format!("capacity out of range: {c}")))
      })
      .transpose()?;

    Ok(Activity {
      activity_id: decode_uuid(&self.activity_id)?,
      title: self.title,
      creator_user_id: decode_uuid(&self.creator_user_id)?,
      class_id: decode_opt_uuid(self.class_id)?,
      status: decode_enum::<ActivityStatus>("activity status", &self.status)?,
      start_at: decode_dt(&self.start_at)?,
      end_at: decode_dt(&self.end_at)?,
      registration_deadline: decode_dt(&self.registration_deadline)?,
      capacity,
      qr_token: self.qr_token,
      rejection_reason: self.rejection_reason,
    })
  }
}

/// Raw strings read directly from a `registrations` row.
pub struct RawRegistration {
  pub registration_id:  String,
  pub student_id:       String,
  pub activity_id:      String,
  pub status:           String,
  pub created_at:       String,
  pub approved_at:      Option<String>,
  pub approver_id:      Option<String>,
  pub rejection_reason: Option<String>,
}

impl RawRegistration {
  pub const COLUMNS: &'static str = "registration_id, student_id, activity_id, status, created_at, \
                             approved_at, approver_id, rejection_reason";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      registration_id:  row.get(0)?,
      student_id:       row.get(1)?,
      activity_id:      row.get(2)?,
      status:           row.get(3)?,
      created_at:       row.get(4)?,
      approved_at:      row.get(5)?,
      approver_id:      row.get(6)?,
      rejection_reason: row.get(7)?,
    })
  }

  pub fn into_registration(self) -> Result<Registration> {
    Ok(Registration {
      registration_id:  decode_uuid(&self.registration_id)?,
      student_id:       decode_uuid(&self.student_id)?,
      activity_id:      decode_uuid(&self.activity_id)?,
      status:           decode_enum::<RegistrationStatus>("registration status", &self.status)?,
      created_at:       decode_dt(&self.created_at)?,
      approved_at:      self.approved_at.as_deref().map(decode_dt).transpose()?,
      approver_id:      decode_opt_uuid(self.approver_id)?,
      rejection_reason: self.rejection_reason,
    })
  }
}

/// Raw strings read directly from an `attendances` row.
pub struct RawAttendance {
  pub attendance_id:         String,
  pub student_id:            String,
  pub activity_id:           String,
  pub checked_in_at:         String,
  pub checked_in_by_user_id: String,
  pub method:                String,
}

impl RawAttendance {
  pub const COLUMNS: &'static str =
    "attendance_id, student_id, activity_id, checked_in_at, checked_in_by_user_id, method";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attendance_id:         row.get(0)?,
      student_id:            row.get(1)?,
      activity_id:           row.get(2)?,
      checked_in_at:         row.get(3)?,
      checked_in_by_user_id: row.get(4)?,
      method:                row.get(5)?,
    })
  }

  pub fn into_attendance(self) -> Result<Attendance> {
    Ok(Attendance {
      attendance_id:         decode_uuid(&self.attendance_id)?,
      student_id:            decode_uuid(&self.student_id)?,
      activity_id:           decode_uuid(&self.activity_id)?,
      checked_in_at:         decode_dt(&self.checked_in_at)?,
      checked_in_by_user_id: decode_uuid(&self.checked_in_by_user_id)?,
      method:                decode_enum::<CheckInMethod>("check-in method", &self.method)?,
    })
  }
}
