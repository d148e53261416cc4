//! Classes and students: the membership graph every scope is derived from.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A class, optionally owned by a homeroom teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
  pub class_id:            Uuid,
  pub name:                String,
  /// Weak reference to the teacher's user id.
  pub homeroom_teacher_id: Option<Uuid>,
}

/// A student record, 1:1 with a user account.
///
/// A student with no `class_id` is valid but scope-orphaned: every scope
/// resolved for them is deny-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
  pub student_id: Uuid,
  pub user_id:    Uuid,
  pub class_id:   Option<Uuid>,
}

impl Student {
  /// True if both students sit in the same (non-null) class.
  pub fn is_classmate_of(&self, other: &Student) -> bool {
    matches!((self.class_id, other.class_id), (Some(a), Some(b)) if a == b)
  }
}
