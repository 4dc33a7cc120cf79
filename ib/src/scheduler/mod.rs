//! Bounded-concurrency task scheduler
//!
//! Owns the worker pool, per-task cancellation, per-session
//! serialization, and all durable writes for task lifecycle, steps, and
//! usage.

mod config;
mod core;

pub use config::SchedulerConfig;
pub use core::{DriverFactory, Scheduler, SchedulerDeps};
