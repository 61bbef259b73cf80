//! `picarx-memory` – Plans that outlive a single request.
//!
//! # Modules
//!
//! - [`plan_store`] – [`PlanStore`][plan_store::PlanStore]: one active plan
//!   per session identifier, single-writer / multi-reader per session.
//! - [`session_store`] – [`SessionStore`][session_store::SessionStore]: the
//!   load/save persistence seam, with in-memory and SQLite backends.

pub mod plan_store;
pub mod session_store;

pub use plan_store::PlanStore;
pub use session_store::{InMemorySessionStore, SessionStore, SessionStoreError, SqliteSessionStore};
