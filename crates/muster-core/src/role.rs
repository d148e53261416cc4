//! Caller identity and role normalisation.
//!
//! Upstream authentication hands us a free-form role label, possibly in
//! Vietnamese with or without diacritics. It is folded into [`Role`] exactly
//! once, at the boundary; nothing past that point sees a raw string.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

/// The closed set of roles the scoping engine understands.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  Admin,
  Teacher,
  ClassMonitor,
  Student,
}

impl Role {
  /// Teacher or ClassMonitor: broader mutation rights without ownership.
  pub fn is_elevated(self) -> bool {
    matches!(self, Self::Teacher | Self::ClassMonitor)
  }

  pub fn is_admin(self) -> bool { self == Self::Admin }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
  type Err = UnknownRole;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    normalize_role(s).ok_or_else(|| UnknownRole(s.to_owned()))
  }
}

/// Fold a free-form role label into a [`Role`].
///
/// Case, surrounding whitespace, separators (space, `-`, `_`) and Vietnamese
/// diacritics are all ignored, so `"Lớp trưởng"`, `"LOP_TRUONG"` and
/// `"lop-truong"` are the same role.
pub fn normalize_role(raw: &str) -> Option<Role> {
  let key = fold(raw);
  let role = match key.as_str() {
    "ADMIN" | "ADMINISTRATOR" | "QUAN_TRI_VIEN" => Role::Admin,
    "TEACHER" | "GIANG_VIEN" => Role::Teacher,
    "CLASS_MONITOR" | "MONITOR" | "LOP_TRUONG" => Role::ClassMonitor,
    "STUDENT" | "SINH_VIEN" => Role::Student,
    _ => return None,
  };
  Some(role)
}

fn fold(raw: &str) -> String {
  let stripped: String = raw
    .trim()
    .to_uppercase()
    .nfd()
    .filter(|c| !is_combining_mark(*c))
    .map(|c| if c == 'Đ' { 'D' } else { c })
    .collect();

  stripped
    .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("_")
}

/// An authenticated caller, resolved upstream. Immutable for the lifetime of
/// a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
  pub id:   Uuid,
  pub role: Role,
}

impl Caller {
  pub fn new(id: Uuid, role: Role) -> Self { Self { id, role } }
}
