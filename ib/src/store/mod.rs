//! Durable state: sessions and tasks
//!
//! Both stores are JSON files under the storage directory, guarded by a
//! mutex and written through on every mutation. Single-process,
//! multi-worker use only.

mod sessions;
mod tasks;

pub use sessions::SessionStore;
pub use tasks::{RESTART_ERROR, TaskStore};
