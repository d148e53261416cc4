//! JSON REST API for Muster.
//!
//! Exposes an axum [`Router`] backed by any [`RosterStore`]. Authentication
//! happens upstream; the authenticated caller arrives in request headers (see
//! [`caller`]).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", muster_api::api_router(store.clone()))
//! ```

pub mod activities;
pub mod caller;
pub mod error;
pub mod listings;
pub mod registrations;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use muster_core::store::RosterStore;
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MUSTER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/muster/muster.db"),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: RosterStore + 'static,
{
  Router::new()
    // Listings
    .route("/{resource}", get(listings::list::<S>))
    // Activities
    .route(
      "/activities",
      get(listings::list_activities::<S>).post(activities::propose::<S>),
    )
    .route("/activities/{id}", get(activities::get_one::<S>))
    .route("/activities/{id}/approve", post(activities::approve::<S>))
    .route("/activities/{id}/reject", post(activities::reject::<S>))
    .route("/activities/{id}/qr", post(activities::issue_qr::<S>))
    .route("/activities/{id}/registrations", post(activities::register::<S>))
    .route("/activities/{id}/attendance", post(activities::check_in::<S>))
    // Registrations
    .route("/registrations/bulk", post(registrations::bulk_action::<S>))
    .route(
      "/registrations/{id}",
      get(registrations::get_one::<S>).delete(registrations::cancel::<S>),
    )
    .route("/registrations/{id}/approve", post(registrations::approve::<S>))
    .route("/registrations/{id}/reject", post(registrations::reject::<S>))
    .route("/registrations/{id}/attend", post(registrations::attend::<S>))
    .with_state(store)
}

pub(crate) fn store_error<E>(e: E) -> ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  ApiError::Store(Box::new(e))
}
