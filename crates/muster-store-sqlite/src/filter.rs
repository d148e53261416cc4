//! Compile a [`Scope`] into a SQL `WHERE` fragment with positional (`?`)
//! parameters.
//!
//! [`Scope::DenyAll`], and any predicate that does not describe the listed
//! resource, compile to the literal `0` so the database returns no rows.

use std::collections::BTreeSet;

use muster_core::scope::{Predicate, Resource, Scope};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::encode::encode_uuid;

#[derive(Debug, PartialEq)]
pub struct Filter {
  pub clause: String,
  pub params: Vec<Value>,
}

impl Filter {
  fn literal(clause: &str) -> Self { Self { clause: clause.to_owned(), params: Vec::new() } }
}

pub fn compile(scope: &Scope, resource: Resource) -> Filter {
  match scope {
    Scope::AllowAll => Filter::literal("1"),
    Scope::DenyAll => Filter::literal("0"),
    Scope::Filter(p) if !p.describes(resource) => Filter::literal("0"),
    Scope::Filter(p) => predicate(p, resource),
  }
}

fn predicate(predicate: &Predicate, resource: Resource) -> Filter {
  match predicate {
    Predicate::CreatorIn(ids) => any_of("creator_user_id", ids),
    Predicate::StudentClassIn(ids) => {
      let inner = any_of("class_id", ids);
      Filter {
        clause: format!(
          "student_id IN (SELECT student_id FROM students WHERE {})",
          inner.clause
        ),
        params: inner.params,
      }
    }
    Predicate::StudentIs(id) => Filter {
      clause: "student_id = ?".to_owned(),
      params: vec![Value::Text(encode_uuid(*id))],
    },
    Predicate::ClassIn(ids) => any_of("class_id", ids),
    Predicate::IdIn(ids) => any_of(primary_key(resource), ids),
  }
}

pub fn primary_key(resource: Resource) -> &'static str {
  match resource {
    Resource::Activities => "activity_id",
    Resource::Registrations => "registration_id",
    Resource::Students => "student_id",
    Resource::Classes => "class_id",
  }
}

/// `column IN (?, ?, ...)`, or `0` for an empty set.
fn any_of(column: &str, ids: &BTreeSet<Uuid>) -> Filter {
  if ids.is_empty() {
    return Filter::literal("0");
  }
  Filter {
    clause: format!("{column} IN ({})", placeholders(ids.len())),
    params: ids.iter().map(|id| Value::Text(encode_uuid(*id))).collect(),
  }
}

pub fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }
