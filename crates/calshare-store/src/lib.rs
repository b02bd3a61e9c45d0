//! # calshare-store
//!
//! SQLite persistence for the calshare server. The crate exposes a
//! synchronous [`Database`] handle wrapping a `rusqlite::Connection` with
//! typed CRUD helpers for the `users` and `events` tables. Schema changes
//! run through versioned migrations guarded by `PRAGMA user_version`.

pub mod database;
pub mod events;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
