//! Core types and decision logic for the Muster activity-registration system.
//!
//! This crate is free of HTTP and database dependencies. It owns
//! the row-level scoping engine, the single-item access guard, and the
//! registration/attendance workflow; storage is reached only through the
//! [`store::RosterStore`] port.

// Native `async fn` in traits; `Send` bounds live on the trait signatures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod attendance;
pub mod bulk;
pub mod directory;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod memory;
pub mod qr;
pub mod registration;
pub mod role;
pub mod scope;
pub mod store;

pub use error::{Entity, Error, Result, Violation};
pub use role::{Caller, Role};

#[cfg(test)]
mod tests;
