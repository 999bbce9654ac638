//! # courrier-store
//!
//! Device-local durable storage for the Courrier client, backed by SQLite.
//!
//! Holds everything that must survive a process restart: the outbound
//! message queue, per-conversation drafts and scroll offsets, and the app
//! settings blob. The crate exposes a synchronous `Database` handle that
//! wraps a `rusqlite::Connection` and provides typed helpers for each of
//! those concerns. Schema changes go through `user_version`-gated
//! migrations that are safe to run on every launch.

pub mod database;
pub mod drafts;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use session::AppSettings;
