//! SQLite backend for the Muster roster store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Scopes are pushed down into the
//! `WHERE` clause of every listing; see [`filter`].

mod encode;
mod filter;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
